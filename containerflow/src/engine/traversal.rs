//! Visit bookkeeping and next-stage selection.

use crate::config::{PipelineConfig, StageSpec, TraversalPolicy};
use crate::errors::{ConfigError, CycleDetectedError, DependencyError, EngineError};
use std::collections::HashSet;

/// Walks a pipeline one stage at a time.
///
/// Owns the per-run visited set. A fresh `Traversal` is built for every run
/// and dropped when it ends.
#[derive(Debug)]
pub struct Traversal<'a> {
    config: &'a PipelineConfig,
    policy: TraversalPolicy,
    visited: HashSet<String>,
    order: Vec<String>,
}

impl<'a> Traversal<'a> {
    /// Starts a walk using the pipeline's traversal policy.
    #[must_use]
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            policy: config.traversal_policy(),
            visited: HashSet::with_capacity(config.stage_count()),
            order: Vec::with_capacity(config.stage_count()),
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> TraversalPolicy {
        self.policy
    }

    /// Returns the stage ids entered so far, in order.
    #[must_use]
    pub fn visited(&self) -> &[String] {
        &self.order
    }

    /// Marks `id` as visited and returns its spec.
    ///
    /// # Errors
    ///
    /// Fails on a revisit, an unknown id, or unmet `depends_on`.
    pub fn enter(&mut self, id: &str) -> Result<&'a StageSpec, EngineError> {
        if self.visited.contains(id) {
            let mut path = self.order.clone();
            path.push(id.to_string());
            return Err(CycleDetectedError::new(path).into());
        }
        self.visited.insert(id.to_string());
        self.order.push(id.to_string());

        let stage = self
            .config
            .stage(id)
            .ok_or_else(|| ConfigError::UnknownStage {
                stage_id: id.to_string(),
            })?;

        let missing = self.unmet_dependencies(stage);
        if !missing.is_empty() {
            return Err(DependencyError::new(id, missing).into());
        }
        Ok(stage)
    }

    /// Picks the stage to run after `current`.
    ///
    /// # Errors
    ///
    /// In dependency mode, fails when stages remain but none can run.
    pub fn next(&self, current: &StageSpec) -> Result<Option<String>, EngineError> {
        match self.policy {
            TraversalPolicy::Chain => Ok(current.next_node.clone()),
            TraversalPolicy::Dependencies => {
                let mut pending = self
                    .config
                    .stages()
                    .iter()
                    .filter(|s| !self.visited.contains(&s.id))
                    .peekable();
                let Some(first_blocked) = pending.peek().copied() else {
                    return Ok(None);
                };
                if let Some(ready) = pending.find(|s| self.unmet_dependencies(s).is_empty()) {
                    return Ok(Some(ready.id.clone()));
                }
                Err(DependencyError::new(&first_blocked.id, self.unmet_dependencies(first_blocked)).into())
            }
        }
    }

    fn unmet_dependencies(&self, stage: &StageSpec) -> Vec<String> {
        stage
            .depends_on
            .iter()
            .filter(|dep| !self.visited.contains(dep.as_str()))
            .cloned()
            .collect()
    }
}
