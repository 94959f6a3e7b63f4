//! JSON bodies exchanged with remote stage services.
//!
//! A stage service accepts `POST /execute` with an [`ExecuteRequest`] and
//! answers with an [`ExecuteResponse`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path stage services serve execute requests on.
pub const EXECUTE_PATH: &str = "/execute";

/// Request sent to a stage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Path the service reads from.
    pub input_file: String,
    /// Path the service writes to.
    pub output_file: String,
    /// Free-form parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Response returned by a stage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Whether the stage succeeded.
    pub success: bool,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl ExecuteResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
