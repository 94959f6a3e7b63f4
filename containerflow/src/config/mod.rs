//! Pipeline description loading and validation.

mod loader;
mod types;

pub use loader::{load_config, parse_config_json, parse_config_str, ConfigFormat};
pub use types::{
    ExecutionDirective, PipelineConfig, StageSpec, TraversalPolicy, VolumeMount,
    DEFAULT_TIMEOUT_SECONDS,
};
