//! Typed pipeline and stage specifications.

use crate::registry::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Default deadline for remote stage calls.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;

/// How a stage is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionDirective {
    /// Run a local process with an explicit argument vector.
    Command {
        /// Program followed by its arguments.
        argv: Vec<String>,
    },
    /// Call the stage's remote service with an input/output file pair.
    Files {
        /// Path the service reads from.
        input_file: String,
        /// Path the service writes to.
        output_file: String,
        /// Free-form parameters forwarded with the request.
        params: BTreeMap<String, String>,
    },
}

impl ExecutionDirective {
    /// Returns true if the stage is dispatched over the network.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Files { .. })
    }

    /// Returns the transport name used in logs.
    #[must_use]
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Command { .. } => "local",
            Self::Files { .. } => "remote",
        }
    }
}

/// Specification for a single stage in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// The unique id of the stage.
    pub id: String,
    /// How the stage is executed.
    pub directive: ExecutionDirective,
    /// The stage to run after this one in a linked chain.
    pub next_node: Option<String>,
    /// Stages that must have run before this one.
    pub depends_on: Vec<String>,
    /// Per-stage deadline override, in seconds.
    pub timeout_seconds: Option<f64>,
}

impl StageSpec {
    /// Creates a local stage from an argument vector.
    #[must_use]
    pub fn command(id: impl Into<String>, argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            directive: ExecutionDirective::Command {
                argv: argv.into_iter().map(Into::into).collect(),
            },
            next_node: None,
            depends_on: Vec::new(),
            timeout_seconds: None,
        }
    }

    /// Creates a remote stage from an input/output file pair.
    #[must_use]
    pub fn files(
        id: impl Into<String>,
        input_file: impl Into<String>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            directive: ExecutionDirective::Files {
                input_file: input_file.into(),
                output_file: output_file.into(),
                params: BTreeMap::new(),
            },
            next_node: None,
            depends_on: Vec::new(),
            timeout_seconds: None,
        }
    }

    /// Sets the successor stage.
    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next_node = Some(next.into());
        self
    }

    /// Sets the predecessor stages.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Adds a request parameter. Has no effect on local stages.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ExecutionDirective::Files { params, .. } = &mut self.directive {
            params.insert(key.into(), value.into());
        }
        self
    }

    /// Returns true if the stage is dispatched over the network.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.directive.is_remote()
    }

    /// Returns the deadline for remote calls, falling back to the default.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    /// Returns the deadline for local processes, if one was declared.
    #[must_use]
    pub fn local_timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(seconds_to_duration)
    }
}

/// Converts seconds to a `Duration`, saturating values it cannot hold.
///
/// Stages built in code skip loader validation, so this must not panic.
fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(if seconds > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// A host directory exposed to container-runtime stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Directory on the orchestrator host.
    pub host: String,
    /// Mount point inside the container.
    pub container: String,
}

impl VolumeMount {
    /// Creates a new mount.
    #[must_use]
    pub fn new(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }

    /// Formats the mount as a `-v` flag value.
    #[must_use]
    pub fn to_flag_value(&self) -> String {
        format!("{}:{}", self.host, self.container)
    }
}

/// How the engine picks the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalPolicy {
    /// Follow each stage's `next_node`.
    Chain,
    /// Run the first declared stage whose `depends_on` are all satisfied.
    #[serde(alias = "dependency_list")]
    Dependencies,
}

impl fmt::Display for TraversalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain => write!(f, "chain"),
            Self::Dependencies => write!(f, "dependencies"),
        }
    }
}

/// A validated pipeline description.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub(crate) name: String,
    pub(crate) stages: Vec<StageSpec>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) start_node: String,
    pub(crate) service_registry: Option<BTreeMap<String, Endpoint>>,
    pub(crate) data_mount: Option<VolumeMount>,
    pub(crate) data_root: Option<String>,
    pub(crate) traversal: Option<TraversalPolicy>,
}

impl PipelineConfig {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&StageSpec> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Returns the stage ids in declaration order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    /// Returns the entry point.
    #[must_use]
    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    /// Returns the declared endpoint mapping, if any.
    #[must_use]
    pub fn service_registry(&self) -> Option<&BTreeMap<String, Endpoint>> {
        self.service_registry.as_ref()
    }

    /// Returns the declared volume mount, if any.
    #[must_use]
    pub fn data_mount(&self) -> Option<&VolumeMount> {
        self.data_mount.as_ref()
    }

    /// Returns the path prefix for remote file paths, if any.
    #[must_use]
    pub fn data_root(&self) -> Option<&str> {
        self.data_root.as_deref()
    }

    /// Returns the traversal policy, inferring it when not declared.
    ///
    /// Without an explicit `traversal`, pipelines in which no stage declares
    /// `next_node` but some stage declares `depends_on` use
    /// [`TraversalPolicy::Dependencies`]; everything else is a chain.
    #[must_use]
    pub fn traversal_policy(&self) -> TraversalPolicy {
        if let Some(policy) = self.traversal {
            return policy;
        }
        let any_next = self.stages.iter().any(|s| s.next_node.is_some());
        let any_deps = self.stages.iter().any(|s| !s.depends_on.is_empty());
        if !any_next && any_deps {
            TraversalPolicy::Dependencies
        } else {
            TraversalPolicy::Chain
        }
    }

    /// Returns the stages a run can reach from `start_node`, in visit order.
    ///
    /// Chains stop at the first revisit. Dependency-list pipelines reach
    /// every stage.
    #[must_use]
    pub fn reachable_stages(&self) -> Vec<&StageSpec> {
        match self.traversal_policy() {
            TraversalPolicy::Dependencies => self.stages.iter().collect(),
            TraversalPolicy::Chain => {
                let mut seen = std::collections::HashSet::new();
                let mut reached = Vec::new();
                let mut current = Some(self.start_node.as_str());
                while let Some(id) = current {
                    if !seen.insert(id) {
                        break;
                    }
                    let Some(stage) = self.stage(id) else { break };
                    reached.push(stage);
                    current = stage.next_node.as_deref();
                }
                reached
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stages: Vec<StageSpec>, start: &str) -> PipelineConfig {
        let index = stages.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
        PipelineConfig {
            name: "test".to_string(),
            stages,
            index,
            start_node: start.to_string(),
            service_registry: None,
            data_mount: None,
            data_root: None,
            traversal: None,
        }
    }

    #[test]
    fn test_stage_spec_builders() {
        let spec = StageSpec::files("a", "in.csv", "out.bin")
            .with_next("b")
            .with_param("mode", "fast")
            .with_timeout_seconds(5.0);

        assert!(spec.is_remote());
        assert_eq!(spec.next_node.as_deref(), Some("b"));
        assert_eq!(spec.remote_timeout(), Duration::from_secs(5));
        match spec.directive {
            ExecutionDirective::Files { params, .. } => assert_eq!(params.get("mode"), Some(&"fast".to_string())),
            ExecutionDirective::Command { .. } => panic!("expected files directive"),
        }
    }

    #[test]
    fn test_default_remote_timeout() {
        let spec = StageSpec::files("a", "in", "out");
        assert_eq!(spec.remote_timeout(), Duration::from_secs(30));
        assert_eq!(spec.local_timeout(), None);
    }

    #[test]
    fn test_oversized_timeout_saturates() {
        let spec = StageSpec::command("a", ["true"]).with_timeout_seconds(1e300);
        assert_eq!(spec.local_timeout(), Some(Duration::MAX));
        assert_eq!(spec.remote_timeout(), Duration::MAX);

        let spec = StageSpec::command("a", ["true"]).with_timeout_seconds(f64::NAN);
        assert_eq!(spec.local_timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn test_traversal_policy_inference() {
        let chain = config(
            vec![StageSpec::command("a", ["true"]).with_next("b"), StageSpec::command("b", ["true"])],
            "a",
        );
        assert_eq!(chain.traversal_policy(), TraversalPolicy::Chain);

        let deps = config(
            vec![
                StageSpec::command("a", ["true"]),
                StageSpec::command("b", ["true"]).with_dependencies(["a"]),
            ],
            "a",
        );
        assert_eq!(deps.traversal_policy(), TraversalPolicy::Dependencies);

        let mut forced = deps.clone();
        forced.traversal = Some(TraversalPolicy::Chain);
        assert_eq!(forced.traversal_policy(), TraversalPolicy::Chain);
    }

    #[test]
    fn test_reachable_stages_follow_chain() {
        let cfg = config(
            vec![
                StageSpec::command("orphan", ["true"]),
                StageSpec::command("a", ["true"]).with_next("b"),
                StageSpec::command("b", ["true"]).with_next("a"),
            ],
            "a",
        );
        let ids: Vec<&str> = cfg.reachable_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_volume_mount_flag() {
        let mount = VolumeMount::new("/srv/data", "/data");
        assert_eq!(mount.to_flag_value(), "/srv/data:/data");
    }
}
