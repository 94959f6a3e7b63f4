//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, warn, Level};

/// Receives lifecycle events.
///
/// Sinks must not fail the run: errors inside a sink are logged and
/// swallowed.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "stage.started")
    /// * `data` - The serialized event, if any
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// A sink that writes events through `tracing`.
///
/// Failures (`stage.failed`, `run.halted`, `run.failed`) are logged at
/// `error`; everything else at the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let field = |key: &str| data.and_then(|d| d.get(key));
        let payload = |key: &str| field("data").and_then(|d| d.get(key));
        let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();

        let node = text(field("node"));
        let run_id = text(field("run_id"));
        let stage = text(payload("stage"));
        let duration_ms = payload("duration_ms").and_then(Value::as_f64);

        match event_type {
            "stage.failed" | "run.halted" | "run.failed" => {
                error!(
                    event_type = %event_type,
                    run_id = %run_id,
                    node = %node,
                    stage = %stage,
                    duration_ms = ?duration_ms,
                    status = "failed",
                    returncode = ?payload("returncode").and_then(serde_json::Value::as_i64),
                    error = %text(payload("error")),
                    "Event: {}", event_type
                );
            }
            _ if self.level == Level::DEBUG => {
                debug!(
                    event_type = %event_type,
                    run_id = %run_id,
                    node = %node,
                    stage = %stage,
                    duration_ms = ?duration_ms,
                    event_data = ?data,
                    "Event: {}", event_type
                );
            }
            _ if self.level == Level::WARN => {
                warn!(event_type = %event_type, run_id = %run_id, node = %node, stage = %stage, "Event: {}", event_type);
            }
            _ => {
                info!(
                    event_type = %event_type,
                    run_id = %run_id,
                    node = %node,
                    stage = %stage,
                    duration_ms = ?duration_ms,
                    "Event: {}", event_type
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
