//! Stage dispatch.
//!
//! A [`Dispatcher`] executes one stage and folds every failure into an
//! [`ExecutionOutcome`]. [`StageDispatcher`] routes each stage to the local
//! or remote strategy according to its directive.

pub mod command;
mod local;
mod outcome;
mod remote;
pub mod wire;

pub use local::LocalDispatcher;
pub use outcome::{codes, ExecutionOutcome};
pub use remote::RemoteDispatcher;

use crate::config::{PipelineConfig, StageSpec};
use crate::registry::Endpoint;
use async_trait::async_trait;

/// Executes a single stage.
///
/// Implementations never return errors; transport and process failures
/// become unsuccessful outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Executes `stage`, calling `endpoint` when the stage is remote.
    async fn execute<'a>(&self, stage: &StageSpec, endpoint: Option<&'a Endpoint>) -> ExecutionOutcome;
}

/// Routes command stages to a [`LocalDispatcher`] and file stages to a
/// [`RemoteDispatcher`].
#[derive(Debug, Clone, Default)]
pub struct StageDispatcher {
    local: LocalDispatcher,
    remote: RemoteDispatcher,
}

impl StageDispatcher {
    /// Creates a router from explicit strategies.
    #[must_use]
    pub fn new(local: LocalDispatcher, remote: RemoteDispatcher) -> Self {
        Self { local, remote }
    }

    /// Creates a router carrying the pipeline's mount and data root.
    #[must_use]
    pub fn for_config(config: &PipelineConfig) -> Self {
        Self {
            local: LocalDispatcher::new().with_data_mount(config.data_mount().cloned()),
            remote: RemoteDispatcher::new().with_data_root(config.data_root().map(str::to_string)),
        }
    }
}

#[async_trait]
impl Dispatcher for StageDispatcher {
    async fn execute<'a>(&self, stage: &StageSpec, endpoint: Option<&'a Endpoint>) -> ExecutionOutcome {
        if stage.is_remote() {
            self.remote.execute(stage, endpoint).await
        } else {
            self.local.execute(stage, endpoint).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_sends_files_stage_to_remote() {
        let stage = StageSpec::files("a", "in", "out");
        let outcome = StageDispatcher::default().execute(&stage, None).await;
        assert_eq!(outcome.error_code.as_deref(), Some(codes::NO_ENDPOINT));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_router_sends_command_stage_to_local() {
        let stage = StageSpec::command("a", ["true"]);
        let outcome = StageDispatcher::default().execute(&stage, None).await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_mock_dispatcher() {
        let mut mock = MockDispatcher::new();
        mock.expect_execute()
            .times(1)
            .returning(|stage, _| ExecutionOutcome::ok(format!("ran {}", stage.id)));

        let stage = StageSpec::command("a", ["true"]);
        let outcome = mock.execute(&stage, None).await;
        assert_eq!(outcome.message, "ran a");
    }
}
