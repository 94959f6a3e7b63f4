//! Service registry mapping stage ids to their network endpoints.
//!
//! The registry is built once, from the pipeline's `service_registry`
//! mapping or from a static table, and is read-only afterwards. Resolution
//! is a plain lookup; no network I/O happens here.

use crate::config::PipelineConfig;
use crate::errors::RegistryError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Network location of one stage service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates a new endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the URL that accepts execute requests.
    #[must_use]
    pub fn execute_url(&self) -> String {
        format!("http://{}:{}/execute", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error returned when a `host:port` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected 'host:port', got '{0}'")]
pub struct EndpointParseError(pub String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError(s.to_string()));
        }
        match port.parse::<u16>() {
            Ok(port) if port != 0 => Ok(Self::new(host, port)),
            _ => Err(EndpointParseError(s.to_string())),
        }
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Read-only lookup table from stage id to endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistry {
    entries: BTreeMap<String, Endpoint>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from a pipeline's `service_registry` mapping.
    ///
    /// Pipelines without a mapping yield an empty registry.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            entries: config.service_registry().cloned().unwrap_or_default(),
        }
    }

    /// Builds the registry from a static `(stage id, host, port)` table.
    #[must_use]
    pub fn from_static(table: &[(&str, &str, u16)]) -> Self {
        Self {
            entries: table
                .iter()
                .map(|(id, host, port)| ((*id).to_string(), Endpoint::new(*host, *port)))
                .collect(),
        }
    }

    /// Resolves the endpoint for a stage.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownStage`] if the stage has no entry.
    pub fn resolve(&self, stage_id: &str) -> Result<&Endpoint, RegistryError> {
        self.entries
            .get(stage_id)
            .ok_or_else(|| RegistryError::unknown_stage(stage_id))
    }

    /// Returns true if the stage has an entry.
    #[must_use]
    pub fn contains(&self, stage_id: &str) -> bool {
        self.entries.contains_key(stage_id)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Endpoint)> for ServiceRegistry {
    fn from_iter<T: IntoIterator<Item = (String, Endpoint)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
