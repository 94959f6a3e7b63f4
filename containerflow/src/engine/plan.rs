//! Dry-run planning and static dependency checks.

use super::traversal::Traversal;
use crate::config::PipelineConfig;
use crate::errors::{CycleDetectedError, EngineError};
use std::collections::HashSet;

/// Walks the pipeline without dispatching and returns the visit order.
///
/// Every stage is assumed to succeed, so the result is the order a fully
/// successful run would take.
///
/// # Errors
///
/// Returns the same cycle and dependency errors a run would hit.
pub fn plan(config: &PipelineConfig) -> Result<Vec<String>, EngineError> {
    let mut walk = Traversal::new(config);
    let mut current = Some(config.start_node().to_string());
    while let Some(id) = current {
        let stage = walk.enter(&id)?;
        current = walk.next(stage)?;
    }
    Ok(walk.visited().to_vec())
}

/// Searches the `depends_on` graph for a cycle.
///
/// The returned error's path starts and ends with the same stage. Returns
/// `None` if the graph is acyclic.
#[must_use]
pub fn detect_dependency_cycles(config: &PipelineConfig) -> Option<CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in config.stages() {
        if !visited.contains(stage.id.as_str()) {
            if let Some(cycle) = dfs_cycle(config, &stage.id, &mut visited, &mut rec_stack, &mut path) {
                return Some(CycleDetectedError::new(cycle));
            }
        }
    }
    None
}

fn dfs_cycle<'a>(
    config: &'a PipelineConfig,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(spec) = config.stage(node) {
        for dep in &spec.depends_on {
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = dfs_cycle(config, dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep.as_str()) {
                let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}
