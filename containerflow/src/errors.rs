//! Error types for containerflow.
//!
//! Validation failures surface as [`ConfigError`] before any stage runs.
//! Traversal failures surface as [`EngineError`]. Stage dispatch failures are
//! never errors: they are reported as
//! [`ExecutionOutcome`](crate::dispatch::ExecutionOutcome) values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while traversing a pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline became inconsistent with its configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A remote stage had no registered endpoint.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A stage was entered twice during one run.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),

    /// A stage's prerequisites were not satisfied when it was reached.
    #[error("{0}")]
    Dependency(#[from] DependencyError),
}

impl EngineError {
    /// Returns the diagnostic info attached to this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::Config(err) => err.error_info(),
            Self::Registry(err) => err.error_info(),
            Self::Cycle(err) => err.error_info.clone(),
            Self::Dependency(err) => err.error_info(),
        }
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "ENGINE-002-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Fills in the fix hint from [`ErrorSuggestions`] when none is set.
    #[must_use]
    fn with_default_hint(mut self) -> Self {
        if self.fix_hint.is_none() {
            self.fix_hint = ErrorSuggestions::get(&self.code).map(str::to_string);
        }
        self
    }
}

/// Error raised when a pipeline description cannot be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The input is not syntactically valid structured data.
    #[error("malformed config: {reason}")]
    Malformed {
        /// The parser's message.
        reason: String,
    },

    /// No stages were declared.
    #[error("config must contain a non-empty 'containers' collection")]
    EmptyPipeline,

    /// A mandatory field is missing or empty.
    #[error("stage '{stage_id}' is missing required field '{field}'")]
    MissingField {
        /// The offending stage (`"<unnamed>"` when the id itself is missing).
        stage_id: String,
        /// The missing field.
        field: String,
    },

    /// A field holds a value outside its allowed range.
    #[error("stage '{stage_id}' has invalid '{field}': {reason}")]
    InvalidField {
        /// The offending stage.
        stage_id: String,
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A keyed stage declares an id that differs from its key.
    #[error("stage keyed '{key}' declares a different id '{id}'")]
    IdMismatch {
        /// The mapping key.
        key: String,
        /// The declared id.
        id: String,
    },

    /// Two stages share an id.
    #[error("stage id '{stage_id}' is declared more than once")]
    DuplicateStage {
        /// The duplicated id.
        stage_id: String,
    },

    /// `start_node` is missing, empty, or does not name a stage.
    #[error("start_node '{start_node}' does not reference an existing stage")]
    UnknownStartNode {
        /// The configured start node (empty when absent).
        start_node: String,
    },

    /// A `next_node` or `depends_on` entry names a stage that does not exist.
    #[error("stage '{stage_id}' references unknown stage '{target}' in '{field}'")]
    UnknownReference {
        /// The referencing stage.
        stage_id: String,
        /// `next_node` or `depends_on`.
        field: String,
        /// The missing target.
        target: String,
    },

    /// A reachable remote stage has no service registry entry.
    #[error("stage '{stage_id}' has no entry in service_registry")]
    MissingEndpoint {
        /// The stage without an endpoint.
        stage_id: String,
    },

    /// A service registry entry is not a valid `host:port` pair.
    #[error("service_registry entry for '{stage_id}' is not a valid host:port: '{value}'")]
    InvalidEndpoint {
        /// The registry key.
        stage_id: String,
        /// The rejected value.
        value: String,
    },

    /// A stage id could not be resolved at run time.
    #[error("stage '{stage_id}' not found in pipeline")]
    UnknownStage {
        /// The unresolved stage.
        stage_id: String,
    },
}

impl ConfigError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing_field(stage_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            stage_id: stage_id.into(),
            field: field.into(),
        }
    }

    /// Creates an unknown-reference error.
    #[must_use]
    pub fn unknown_reference(
        stage_id: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::UnknownReference {
            stage_id: stage_id.into(),
            field: field.into(),
            target: target.into(),
        }
    }

    /// Returns the stage this error refers to, if any.
    #[must_use]
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            Self::MissingField { stage_id, .. }
            | Self::InvalidField { stage_id, .. }
            | Self::DuplicateStage { stage_id }
            | Self::UnknownReference { stage_id, .. }
            | Self::MissingEndpoint { stage_id }
            | Self::InvalidEndpoint { stage_id, .. }
            | Self::UnknownStage { stage_id } => Some(stage_id),
            Self::IdMismatch { key, .. } => Some(key),
            Self::Io { .. } | Self::Malformed { .. } | Self::EmptyPipeline | Self::UnknownStartNode { .. } => None,
        }
    }

    /// Returns the machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG-001-IO",
            Self::Malformed { .. } => "CONFIG-001-MALFORMED",
            Self::EmptyPipeline => "CONFIG-001-EMPTY",
            Self::MissingField { .. } => "CONFIG-001-MISSING_FIELD",
            Self::InvalidField { .. } => "CONFIG-001-INVALID_FIELD",
            Self::IdMismatch { .. } => "CONFIG-001-ID_MISMATCH",
            Self::DuplicateStage { .. } => "CONFIG-001-DUPLICATE",
            Self::UnknownStartNode { .. } => "CONFIG-001-START_NODE",
            Self::UnknownReference { .. } => "CONFIG-001-UNKNOWN_REF",
            Self::MissingEndpoint { .. } => "CONFIG-001-MISSING_ENDPOINT",
            Self::InvalidEndpoint { .. } => "CONFIG-001-INVALID_ENDPOINT",
            Self::UnknownStage { .. } => "CONFIG-001-UNKNOWN_STAGE",
        }
    }

    /// Converts to diagnostic info.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let mut info = ContractErrorInfo::new(self.code(), self.to_string());
        if let Some(stage) = self.stage_id() {
            info = info.with_context_entry("stage", stage);
        }
        info.with_default_hint()
    }
}

/// Error raised when a stage has no registered endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The stage id is not present in the registry.
    #[error("no endpoint registered for stage '{stage_id}'")]
    UnknownStage {
        /// The unresolved stage.
        stage_id: String,
    },
}

impl RegistryError {
    /// Creates an unknown-stage error.
    #[must_use]
    pub fn unknown_stage(stage_id: impl Into<String>) -> Self {
        Self::UnknownStage {
            stage_id: stage_id.into(),
        }
    }

    /// Converts to diagnostic info.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::UnknownStage { stage_id } => {
                ContractErrorInfo::new("ENGINE-001-REGISTRY", self.to_string())
                    .with_context_entry("stage", stage_id)
                    .with_default_hint()
            }
        }
    }
}

/// Error raised when a run re-enters a stage it already visited.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The visit path, ending with the revisited stage.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "ENGINE-002-CYCLE",
            format!("Pipeline revisits a stage: {}", cycle_path.join(" -> ")),
        )
        .with_default_hint();

        Self {
            cycle_path,
            error_info: info,
        }
    }

    /// Returns the stage that was entered twice.
    #[must_use]
    pub fn stage(&self) -> &str {
        self.cycle_path.last().map_or("", String::as_str)
    }
}

/// Error raised when a stage is reached before its prerequisites ran.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage '{stage}' reached before its dependencies ran: {}", missing.join(", "))]
pub struct DependencyError {
    /// The blocked stage.
    pub stage: String,
    /// Declared dependencies that were not yet visited.
    pub missing: Vec<String>,
}

impl DependencyError {
    /// Creates a new dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            missing,
        }
    }

    /// Converts to diagnostic info.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        ContractErrorInfo::new("ENGINE-003-DEPENDENCY", self.to_string())
            .with_context_entry("stage", &self.stage)
            .with_context_entry("missing", self.missing.join(","))
            .with_default_hint()
    }
}

/// Provides default suggestions for common error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONFIG-001-MALFORMED" => Some("Check the file for syntax errors such as trailing commas or unbalanced braces."),
            "CONFIG-001-EMPTY" => Some("Declare at least one stage under 'containers'."),
            "CONFIG-001-MISSING_FIELD" => Some(
                "Every stage needs an 'id' and either a 'command' or both 'input_file' and 'output_file'.",
            ),
            "CONFIG-001-START_NODE" => Some("Set 'start_node' to the id of one of the declared stages."),
            "CONFIG-001-UNKNOWN_REF" => Some("Check 'next_node' and 'depends_on' for typos in stage ids."),
            "CONFIG-001-MISSING_ENDPOINT" | "ENGINE-001-REGISTRY" => {
                Some("Add a 'host:port' entry for the stage to 'service_registry'.")
            }
            "ENGINE-002-CYCLE" => Some(
                "Follow the 'next_node' chain and break the loop so every stage is entered once.",
            ),
            "ENGINE-003-DEPENDENCY" => Some(
                "Reorder the chain so that every stage listed in 'depends_on' runs first.",
            ),
            _ => None,
        }
    }
}
