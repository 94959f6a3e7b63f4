//! Runtime settings read from the environment.

use std::env;
use std::path::PathBuf;

/// Environment variable naming the pipeline config file.
pub const PIPELINE_CONFIG_ENV: &str = "PIPELINE_CONFIG";
/// Config path used when neither an argument nor `PIPELINE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.json";
/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Default log file name inside the log directory.
pub const DEFAULT_LOG_FILE: &str = "execution_log.log";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Node label used when no host name is available.
pub const DEFAULT_NODE_NAME: &str = "localhost";

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory holding the log file.
    pub log_dir: PathBuf,
    /// File name of the JSON log.
    pub log_file: String,
    /// Default filter directive, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Whether to also log JSON to stdout.
    pub stdout: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_file: DEFAULT_LOG_FILE.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            stdout: true,
        }
    }
}

impl LoggingSettings {
    /// Reads `LOG_DIR`, `LOG_FILE` and `LOG_LEVEL`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_dir: non_empty_var("LOG_DIR").map_or(defaults.log_dir, PathBuf::from),
            log_file: non_empty_var("LOG_FILE").unwrap_or(defaults.log_file),
            log_level: non_empty_var("LOG_LEVEL").unwrap_or(defaults.log_level),
            stdout: defaults.stdout,
        }
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Returns the full path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

/// Returns the node label stamped on lifecycle events.
///
/// Uses `NODE_NAME`, then `HOSTNAME`, then `"localhost"`.
#[must_use]
pub fn node_name() -> String {
    non_empty_var("NODE_NAME")
        .or_else(|| non_empty_var("HOSTNAME"))
        .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.log_path(), PathBuf::from("logs/execution_log.log"));
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_builders() {
        let settings = LoggingSettings::default()
            .with_log_dir("/tmp/cf")
            .with_log_level("debug");
        assert_eq!(settings.log_path(), PathBuf::from("/tmp/cf/execution_log.log"));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_node_name_is_never_empty() {
        assert!(!node_name().is_empty());
    }
}
