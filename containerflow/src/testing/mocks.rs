//! Scripted dispatchers for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::config::StageSpec;
use crate::dispatch::{Dispatcher, ExecutionOutcome};
use crate::registry::Endpoint;

/// A dispatcher that returns canned outcomes and records every call.
///
/// Stages without a scripted outcome succeed.
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    outcomes: Mutex<HashMap<String, ExecutionOutcome>>,
    calls: Mutex<Vec<(String, Option<Endpoint>)>>,
}

impl ScriptedDispatcher {
    /// Creates a dispatcher where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome for a stage.
    #[must_use]
    pub fn with_outcome(self, stage_id: impl Into<String>, outcome: ExecutionOutcome) -> Self {
        self.outcomes.lock().insert(stage_id.into(), outcome);
        self
    }

    /// Scripts a failure with the given message.
    #[must_use]
    pub fn failing(self, stage_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_outcome(stage_id, ExecutionOutcome::failed(message))
    }

    /// Returns the dispatched stage ids in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Returns the endpoint passed with each call.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Option<Endpoint>> {
        self.calls.lock().iter().map(|(_, ep)| ep.clone()).collect()
    }

    /// Returns how many times a stage was dispatched.
    #[must_use]
    pub fn call_count(&self, stage_id: &str) -> usize {
        self.calls.lock().iter().filter(|(id, _)| id == stage_id).count()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn execute<'a>(&self, stage: &StageSpec, endpoint: Option<&'a Endpoint>) -> ExecutionOutcome {
        self.calls.lock().push((stage.id.clone(), endpoint.cloned()));
        self.outcomes
            .lock()
            .get(&stage.id)
            .cloned()
            .unwrap_or_else(|| ExecutionOutcome::ok(format!("{} ok", stage.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let dispatcher = ScriptedDispatcher::new().failing("b", "bad input");
        let a = StageSpec::command("a", ["true"]);
        let b = StageSpec::command("b", ["true"]);

        assert!(dispatcher.execute(&a, None).await.success);
        let failed = dispatcher.execute(&b, None).await;
        assert!(!failed.success);
        assert_eq!(failed.message, "bad input");

        assert_eq!(dispatcher.calls(), vec!["a", "b"]);
        assert_eq!(dispatcher.call_count("b"), 1);
        dispatcher.reset();
        assert!(dispatcher.calls().is_empty());
    }
}
