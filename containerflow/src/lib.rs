//! # Containerflow
//!
//! A workflow engine for pipelines of independently deployable processing
//! stages ("containers").
//!
//! A pipeline is described declaratively (JSON or YAML). Each stage is either
//! a local command, run as a child process with an explicit argument vector,
//! or a remote stage service called over HTTP/JSON. The engine:
//!
//! - **Validates once**: the description becomes a typed [`config::PipelineConfig`]
//!   before anything runs
//! - **Walks one stage at a time**: following `next_node` links, or picking the
//!   next stage whose `depends_on` are satisfied
//! - **Halts on first failure**: a failed stage stops the run and is reported
//!   in the [`engine::RunReport`]
//! - **Detects cycles**: re-entering a visited stage aborts the run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use containerflow::prelude::*;
//!
//! let config = load_config("config/pipeline.json")?;
//! let report = WorkflowEngine::from_config(config).run().await?;
//! assert!(report.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod registry;
pub mod settings;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        load_config, parse_config_str, ConfigFormat, ExecutionDirective, PipelineConfig,
        StageSpec, TraversalPolicy, VolumeMount,
    };
    pub use crate::dispatch::{
        Dispatcher, ExecutionOutcome, LocalDispatcher, RemoteDispatcher, StageDispatcher,
    };
    pub use crate::engine::{plan, RunReport, RunState, StageFailure, WorkflowEngine};
    pub use crate::errors::{
        ConfigError, ContractErrorInfo, CycleDetectedError, DependencyError, EngineError,
        RegistryError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::registry::{Endpoint, ServiceRegistry};
}
