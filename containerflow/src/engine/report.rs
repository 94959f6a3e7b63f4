//! Run state and the report returned by a finished run.

use crate::dispatch::ExecutionOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Per-run state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    /// Nothing dispatched yet.
    Ready,
    /// The named stage is executing.
    Running(String),
    /// The last stage succeeded and traversal continues.
    Continuing,
    /// A stage failed and the run stopped.
    Halted,
    /// No stage remains.
    Completed,
}

impl RunState {
    /// Returns true for `Halted` and `Completed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::Completed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Running(stage) => write!(f, "running({stage})"),
            Self::Continuing => write!(f, "continuing"),
            Self::Halted => write!(f, "halted"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One dispatched stage and what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage id.
    pub stage_id: String,
    /// `"local"` or `"remote"`.
    pub transport: String,
    /// The dispatch outcome.
    pub outcome: ExecutionOutcome,
}

/// The stage that halted a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The failing stage.
    pub stage_id: String,
    /// The outcome message.
    pub message: String,
    /// Transport error code, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Process exit code, for local stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}' failed: {}", self.stage_id, self.message)
    }
}

/// Result of a run that reached `Completed` or `Halted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Terminal state.
    pub state: RunState,
    /// Dispatched stages in order.
    pub stages: Vec<StageRecord>,
    /// Set when the run halted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// Total wall-clock time in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if every reached stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Returns the dispatched stage ids in order.
    #[must_use]
    pub fn visited(&self) -> Vec<&str> {
        self.stages.iter().map(|r| r.stage_id.as_str()).collect()
    }

    /// Returns the total duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_ms.max(0.0) / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_serialization() {
        let running = serde_json::to_value(RunState::Running("a".into())).unwrap();
        assert_eq!(running, serde_json::json!({"state": "running", "stage": "a"}));

        let done = serde_json::to_value(RunState::Completed).unwrap();
        assert_eq!(done, serde_json::json!({"state": "completed"}));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Halted.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(!RunState::Running("a".into()).is_terminal());
        assert!(!RunState::Continuing.is_terminal());
    }

    #[test]
    fn test_failure_display() {
        let failure = StageFailure {
            stage_id: "a".into(),
            message: "bad input".into(),
            error_code: None,
            exit_code: None,
        };
        assert_eq!(failure.to_string(), "stage 'a' failed: bad input");
    }
}
