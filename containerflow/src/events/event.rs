//! Run and stage lifecycle events.

use super::EventSink;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Event type names.
pub mod kinds {
    /// A run began.
    pub const RUN_STARTED: &str = "run.started";
    /// Every reachable stage succeeded.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A stage failed and the run stopped.
    pub const RUN_HALTED: &str = "run.halted";
    /// The run aborted on an engine error.
    pub const RUN_FAILED: &str = "run.failed";
    /// A stage is about to be dispatched.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage succeeded.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";

    /// Returns true for the three terminal run events.
    #[must_use]
    pub fn is_terminal(kind: &str) -> bool {
        matches!(kind, RUN_COMPLETED | RUN_HALTED | RUN_FAILED)
    }
}

/// Identity stamped on every event of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventScope {
    /// The run id.
    pub run_id: Uuid,
    /// The node label of the orchestrator host.
    pub node: String,
}

impl EventScope {
    /// Creates a scope.
    #[must_use]
    pub fn new(run_id: Uuid, node: impl Into<String>) -> Self {
        Self {
            run_id,
            node: node.into(),
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// The event type, one of [`kinds`].
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event occurred (ISO 8601, UTC).
    pub timestamp: String,
    /// The run this event belongs to.
    pub run_id: Uuid,
    /// Node label of the orchestrator host.
    pub node: String,
    /// Event payload.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl LifecycleEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, scope: &EventScope) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: scope.run_id,
            node: scope.node.clone(),
            data: Map::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a `run.started` event.
    #[must_use]
    pub fn run_started(scope: &EventScope, pipeline: &str, start_node: &str, traversal: &str) -> Self {
        Self::new(kinds::RUN_STARTED, scope)
            .add_data("pipeline", json!(pipeline))
            .add_data("start_node", json!(start_node))
            .add_data("traversal", json!(traversal))
    }

    /// Creates a `stage.started` event.
    #[must_use]
    pub fn stage_started(scope: &EventScope, stage: &str, transport: &str) -> Self {
        Self::new(kinds::STAGE_STARTED, scope)
            .add_data("stage", json!(stage))
            .add_data("transport", json!(transport))
    }

    /// Creates a `stage.completed` event.
    #[must_use]
    pub fn stage_completed(scope: &EventScope, stage: &str, duration_ms: f64) -> Self {
        Self::new(kinds::STAGE_COMPLETED, scope)
            .add_data("stage", json!(stage))
            .add_data("duration_ms", json!(duration_ms))
    }

    /// Creates a `stage.failed` event.
    #[must_use]
    pub fn stage_failed(
        scope: &EventScope,
        stage: &str,
        duration_ms: f64,
        message: &str,
        error_code: Option<&str>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::new(kinds::STAGE_FAILED, scope)
            .add_data("stage", json!(stage))
            .add_data("duration_ms", json!(duration_ms))
            .add_data("error", json!(message))
            .add_data("error_code", json!(error_code))
            .add_data("returncode", json!(exit_code))
    }

    /// Creates a `run.completed` event.
    #[must_use]
    pub fn run_completed(scope: &EventScope, visited: &[String], duration_ms: f64) -> Self {
        Self::new(kinds::RUN_COMPLETED, scope)
            .add_data("visited", json!(visited))
            .add_data("duration_ms", json!(duration_ms))
    }

    /// Creates a `run.halted` event.
    #[must_use]
    pub fn run_halted(scope: &EventScope, stage: &str, message: &str, duration_ms: f64) -> Self {
        Self::new(kinds::RUN_HALTED, scope)
            .add_data("stage", json!(stage))
            .add_data("error", json!(message))
            .add_data("duration_ms", json!(duration_ms))
    }

    /// Creates a `run.failed` event.
    #[must_use]
    pub fn run_failed(scope: &EventScope, code: &str, message: &str, duration_ms: f64) -> Self {
        Self::new(kinds::RUN_FAILED, scope)
            .add_data("code", json!(code))
            .add_data("error", json!(message))
            .add_data("duration_ms", json!(duration_ms))
    }

    /// Returns a payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Converts the event into the JSON value handed to sinks.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Sends the event to a sink.
    pub async fn emit_to(&self, sink: &dyn EventSink) {
        sink.emit(&self.event_type, Some(self.to_value())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> EventScope {
        EventScope::new(Uuid::nil(), "node-1")
    }

    #[test]
    fn test_event_carries_scope() {
        let event = LifecycleEvent::stage_started(&scope(), "gen", "local");
        assert_eq!(event.event_type, "stage.started");
        assert_eq!(event.node, "node-1");
        assert_eq!(event.get("stage"), Some(&json!("gen")));
        assert!(event.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_failed_event_payload() {
        let event = LifecycleEvent::stage_failed(&scope(), "a", 12.5, "bad input", None, Some(2));
        let value = event.to_value();
        assert_eq!(value["type"], "stage.failed");
        assert_eq!(value["data"]["error"], "bad input");
        assert_eq!(value["data"]["returncode"], 2);
        assert!(value["data"]["error_code"].is_null());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(kinds::is_terminal(kinds::RUN_COMPLETED));
        assert!(kinds::is_terminal(kinds::RUN_HALTED));
        assert!(kinds::is_terminal(kinds::RUN_FAILED));
        assert!(!kinds::is_terminal(kinds::STAGE_FAILED));
    }
}
