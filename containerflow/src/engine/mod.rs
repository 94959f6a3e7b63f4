//! Workflow execution.
//!
//! [`WorkflowEngine`] walks a validated pipeline from its start node,
//! dispatching one stage at a time and halting on the first failure.
//! [`plan`] performs the same walk without dispatching.

mod plan;
mod report;
mod traversal;
mod workflow;

pub use plan::{detect_dependency_cycles, plan};
pub use report::{RunReport, RunState, StageFailure, StageRecord};
pub use traversal::Traversal;
pub use workflow::WorkflowEngine;
