//! Result of dispatching a single stage.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error codes attached to failed outcomes.
pub mod codes {
    /// The endpoint refused or dropped the connection.
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    /// The call or process exceeded its deadline.
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
    /// Any other transport-level failure.
    pub const INTERNAL: &str = "INTERNAL";
    /// The service replied with something other than an execute response.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    /// A remote stage had no endpoint to call.
    pub const NO_ENDPOINT: &str = "NO_ENDPOINT";
    /// The local process exited with a non-zero status.
    pub const NONZERO_EXIT: &str = "NONZERO_EXIT";
    /// The local process could not be started.
    pub const SPAWN_FAILED: &str = "SPAWN_FAILED";
    /// The local process was killed after its timeout.
    pub const TIMEOUT: &str = "TIMEOUT";
}

/// Outcome of executing one stage, local or remote.
///
/// Dispatch never fails with an error; every failure mode is folded into an
/// unsuccessful outcome with a message and, usually, an error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether the stage succeeded.
    pub success: bool,
    /// Human-readable message. Empty on plain local success.
    pub message: String,
    /// Wall-clock time spent dispatching.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Process exit code, for local stages that ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured standard output, for local stages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Captured standard error, for local stages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ExecutionOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            duration: Duration::ZERO,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error_code: None,
        }
    }

    /// Creates a failed outcome without an error code.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    /// Creates a failed outcome tagged with an error code.
    #[must_use]
    pub fn failed_with_code(code: &str, message: impl Into<String>) -> Self {
        Self::failed(message).with_error_code(code)
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Sets the elapsed time.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Sets the captured output streams.
    #[must_use]
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
