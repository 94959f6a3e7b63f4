//! The workflow engine run loop.

use super::report::{RunReport, RunState, StageFailure, StageRecord};
use super::traversal::Traversal;
use crate::config::{PipelineConfig, StageSpec};
use crate::dispatch::{Dispatcher, ExecutionOutcome, StageDispatcher};
use crate::errors::EngineError;
use crate::events::{EventScope, EventSink, LifecycleEvent, LoggingEventSink};
use crate::observability::SpanTimer;
use crate::registry::ServiceRegistry;
use crate::settings;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Runs a validated pipeline one stage at a time.
///
/// Each call to [`run`](Self::run) is independent: the visited set and run
/// state live only for the duration of the call.
pub struct WorkflowEngine {
    config: PipelineConfig,
    registry: ServiceRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    sink: Arc<dyn EventSink>,
    node: String,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("pipeline", &self.config.name())
            .field("stages", &self.config.stage_count())
            .field("registry", &self.registry)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Mutable state of a single run, owned by [`WorkflowEngine::run`].
#[derive(Debug)]
struct RunProgress {
    state: RunState,
    records: Vec<StageRecord>,
    failure: Option<StageFailure>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            state: RunState::Ready,
            records: Vec::new(),
            failure: None,
        }
    }

    fn advance(&mut self, to: RunState) {
        debug!(from = %self.state, to = %to, "Run state transition");
        self.state = to;
    }

    fn visited(&self) -> Vec<String> {
        self.records.iter().map(|r| r.stage_id.clone()).collect()
    }
}

impl WorkflowEngine {
    /// Creates an engine from explicit collaborators.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        registry: ServiceRegistry,
        dispatcher: Arc<dyn Dispatcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            sink,
            node: settings::node_name(),
        }
    }

    /// Creates an engine wired with the registry, dispatchers and logging
    /// sink the config describes.
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        let registry = ServiceRegistry::from_config(&config);
        let dispatcher = Arc::new(StageDispatcher::for_config(&config));
        Self::new(config, registry, dispatcher, Arc::new(LoggingEventSink::default()))
    }

    /// Overrides the node label stamped on events.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Returns the pipeline being run.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Executes the pipeline from `start_node`.
    ///
    /// A stage failure halts the run and is reported through
    /// [`RunReport::failure`]; it is not an error. Exactly one terminal event
    /// is emitted whatever the result.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] on a cycle, an unmet dependency, an
    /// unknown stage, or a remote stage without an endpoint.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let scope = EventScope::new(Uuid::new_v4(), self.node.clone());
        let timer = SpanTimer::start(format!("run:{}", self.config.name()));
        let policy = self.config.traversal_policy();

        info!(
            run_id = %scope.run_id,
            pipeline = %self.config.name(),
            start_node = %self.config.start_node(),
            traversal = %policy,
            node = %self.node,
            "Pipeline run started"
        );
        self.emit(LifecycleEvent::run_started(
            &scope,
            self.config.name(),
            self.config.start_node(),
            &policy.to_string(),
        ))
        .await;

        let mut progress = RunProgress::new();
        let result = self.drive(&scope, &mut progress).await;
        let duration_ms = timer.finish();

        if let Err(err) = result {
            let info = err.error_info();
            error!(
                run_id = %scope.run_id,
                code = %info.code,
                error = %err,
                state = %progress.state,
                duration_ms,
                status = "failed",
                "Pipeline run aborted"
            );
            self.emit(LifecycleEvent::run_failed(&scope, &info.code, &err.to_string(), duration_ms))
                .await;
            return Err(err);
        }

        match &progress.failure {
            None => {
                let visited = progress.visited();
                info!(
                    run_id = %scope.run_id,
                    visited = ?visited,
                    duration_ms,
                    status = %progress.state,
                    "Pipeline run completed"
                );
                self.emit(LifecycleEvent::run_completed(&scope, &visited, duration_ms))
                    .await;
            }
            Some(failure) => {
                error!(
                    run_id = %scope.run_id,
                    stage = %failure.stage_id,
                    error = %failure.message,
                    duration_ms,
                    status = %progress.state,
                    "Pipeline halted"
                );
                self.emit(LifecycleEvent::run_halted(
                    &scope,
                    &failure.stage_id,
                    &failure.message,
                    duration_ms,
                ))
                .await;
            }
        }
        Ok(self.report(&scope, progress, duration_ms))
    }

    /// Walks the pipeline, leaving `progress` in `Completed` or `Halted`
    /// on success and in the state where it stopped on error.
    async fn drive(&self, scope: &EventScope, progress: &mut RunProgress) -> Result<(), EngineError> {
        let mut walk = Traversal::new(&self.config);
        let mut current = Some(self.config.start_node().to_string());

        while let Some(id) = current {
            let stage = walk.enter(&id)?;
            progress.advance(RunState::Running(stage.id.clone()));
            let endpoint = if stage.is_remote() {
                Some(self.registry.resolve(&stage.id)?)
            } else {
                None
            };

            self.emit(LifecycleEvent::stage_started(scope, &stage.id, stage.directive.transport()))
                .await;

            let outcome = self.dispatcher.execute(stage, endpoint).await;
            self.record_outcome(scope, stage, &outcome).await;
            progress.records.push(StageRecord {
                stage_id: stage.id.clone(),
                transport: stage.directive.transport().to_string(),
                outcome: outcome.clone(),
            });

            if !outcome.success {
                progress.failure = Some(StageFailure {
                    stage_id: stage.id.clone(),
                    message: outcome.message,
                    error_code: outcome.error_code,
                    exit_code: outcome.exit_code,
                });
                progress.advance(RunState::Halted);
                return Ok(());
            }

            progress.advance(RunState::Continuing);
            current = walk.next(stage)?;
        }

        progress.advance(RunState::Completed);
        Ok(())
    }

    async fn record_outcome(&self, scope: &EventScope, stage: &StageSpec, outcome: &ExecutionOutcome) {
        let duration_ms = outcome.duration_ms();
        if outcome.success {
            info!(
                run_id = %scope.run_id,
                stage = %stage.id,
                duration_ms,
                status = "success",
                returncode = ?outcome.exit_code,
                node = %self.node,
                "Stage completed"
            );
            self.emit(LifecycleEvent::stage_completed(scope, &stage.id, duration_ms))
                .await;
        } else {
            warn!(
                run_id = %scope.run_id,
                stage = %stage.id,
                duration_ms,
                status = "failed",
                returncode = ?outcome.exit_code,
                error_code = ?outcome.error_code,
                error = %outcome.message,
                node = %self.node,
                "Stage failed"
            );
            self.emit(LifecycleEvent::stage_failed(
                scope,
                &stage.id,
                duration_ms,
                &outcome.message,
                outcome.error_code.as_deref(),
                outcome.exit_code,
            ))
            .await;
        }
    }

    fn report(&self, scope: &EventScope, progress: RunProgress, duration_ms: f64) -> RunReport {
        RunReport {
            run_id: scope.run_id,
            pipeline: self.config.name().to_string(),
            state: progress.state,
            stages: progress.records,
            failure: progress.failure,
            duration_ms,
        }
    }

    async fn emit(&self, event: LifecycleEvent) {
        event.emit_to(self.sink.as_ref()).await;
    }
}
