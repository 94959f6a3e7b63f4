use crate::settings::LoggingSettings;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Error raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory or file could not be opened.
    #[error("cannot open log file '{}': {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The level string is not a valid filter directive.
    #[error("invalid log level '{level}': {reason}")]
    Filter {
        /// The rejected directive.
        level: String,
        /// The parser's message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Installs JSON logging to `LOG_DIR/LOG_FILE` and, optionally, stdout.
///
/// `RUST_LOG` takes precedence over `settings.log_level`. Returns the path
/// of the log file.
pub fn init_logging(settings: &LoggingSettings) -> Result<PathBuf, LoggingError> {
    fs::create_dir_all(&settings.log_dir).map_err(|source| LoggingError::Io {
        path: settings.log_dir.clone(),
        source,
    })?;

    let path = settings.log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::Io {
            path: path.clone(),
            source,
        })?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_level).map_err(|e| LoggingError::Filter {
            level: settings.log_level.clone(),
            reason: e.to_string(),
        })?,
    };

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(false)
        .with_writer(Mutex::new(file));
    let stdout_layer = settings
        .stdout
        .then(|| fmt::layer().json().with_current_span(false).with_writer(std::io::stdout));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(path)
}
