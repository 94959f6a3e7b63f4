//! Loading and validating pipeline descriptions.
//!
//! Raw documents are deserialized into loosely-typed `*Document` structs,
//! then validated once into a [`PipelineConfig`]. Nothing downstream looks
//! at the raw form.

use super::types::{
    ExecutionDirective, PipelineConfig, StageSpec, TraversalPolicy, VolumeMount,
};
use crate::dispatch::command;
use crate::errors::ConfigError;
use crate::registry::Endpoint;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Name used for the `id` field in error messages when a stage has none.
const UNNAMED_STAGE: &str = "<unnamed>";

/// Structured-data formats accepted by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON.
    Json,
    /// YAML.
    Yaml,
}

impl ConfigFormat {
    /// Picks the format from a file extension, defaulting to JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Reads and validates a pipeline description from disk.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or fails validation.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = parse_config_str(&content, ConfigFormat::from_path(path))?;
    if config.name.is_empty() {
        config.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_PIPELINE_NAME)
            .to_string();
    }

    info!(
        path = %path.display(),
        pipeline = %config.name,
        stages = config.stage_count(),
        start_node = %config.start_node,
        "Configuration parsed and validated"
    );
    Ok(config)
}

/// Name given to pipelines that declare none and are not loaded from a file.
const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Parses and validates a pipeline description held in memory.
///
/// The returned config has an empty name when the document declares none;
/// [`load_config`] fills it from the file stem.
///
/// # Errors
///
/// Returns a [`ConfigError`] describing the first validation rule violated.
pub fn parse_config_str(content: &str, format: ConfigFormat) -> Result<PipelineConfig, ConfigError> {
    let document: ConfigDocument = match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Malformed {
            reason: e.to_string(),
        })?,
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::Malformed {
            reason: e.to_string(),
        })?,
    };
    validate(document)
}

/// Parses a JSON pipeline description and names it `"pipeline"` if unnamed.
///
/// # Errors
///
/// Returns a [`ConfigError`] describing the first validation rule violated.
pub fn parse_config_json(content: &str) -> Result<PipelineConfig, ConfigError> {
    let mut config = parse_config_str(content, ConfigFormat::Json)?;
    if config.name.is_empty() {
        config.name = DEFAULT_PIPELINE_NAME.to_string();
    }
    Ok(config)
}

fn validate(document: ConfigDocument) -> Result<PipelineConfig, ConfigError> {
    let entries: Vec<(Option<String>, StageDocument)> = match document.containers {
        None => return Err(ConfigError::EmptyPipeline),
        Some(ContainersDocument::List(list)) => list
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Ok((None, decode_stage(raw, || format!("containers[{i}]"))?)))
            .collect::<Result<Vec<_>, ConfigError>>()?,
        Some(ContainersDocument::Map(OrderedStages(pairs))) => pairs
            .into_iter()
            .map(|(key, raw)| {
                let stage = decode_stage(raw, || format!("stage '{key}'"))?;
                Ok((Some(key), stage))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
    };
    if entries.is_empty() {
        return Err(ConfigError::EmptyPipeline);
    }

    let registry = match document.service_registry {
        None => None,
        Some(raw) => {
            let mut parsed = BTreeMap::new();
            for (stage_id, value) in raw {
                let endpoint: Endpoint = value.parse().map_err(|_| ConfigError::InvalidEndpoint {
                    stage_id: stage_id.clone(),
                    value: value.clone(),
                })?;
                parsed.insert(stage_id, endpoint);
            }
            Some(parsed)
        }
    };

    let mut stages = Vec::with_capacity(entries.len());
    let mut index = HashMap::with_capacity(entries.len());
    for (key, doc) in entries {
        let stage = validate_stage(key, doc, registry.as_ref())?;
        if index.insert(stage.id.clone(), stages.len()).is_some() {
            return Err(ConfigError::DuplicateStage { stage_id: stage.id });
        }
        stages.push(stage);
    }

    let start_node = document.start_node.unwrap_or_default();
    if start_node.is_empty() || !index.contains_key(&start_node) {
        return Err(ConfigError::UnknownStartNode { start_node });
    }

    for stage in &stages {
        if let Some(next) = &stage.next_node {
            if !index.contains_key(next) {
                return Err(ConfigError::unknown_reference(&stage.id, "next_node", next));
            }
        }
        for dep in &stage.depends_on {
            if !index.contains_key(dep) {
                return Err(ConfigError::unknown_reference(&stage.id, "depends_on", dep));
            }
        }
    }

    let config = PipelineConfig {
        name: document.name.unwrap_or_default(),
        stages,
        index,
        start_node,
        service_registry: registry,
        data_mount: document.data_mount,
        data_root: document.data_root.filter(|r| !r.is_empty()),
        traversal: document.traversal,
    };

    if let Some(registry) = config.service_registry() {
        for stage in config.reachable_stages() {
            if stage.is_remote() && !registry.contains_key(&stage.id) {
                return Err(ConfigError::MissingEndpoint {
                    stage_id: stage.id.clone(),
                });
            }
        }
    }

    debug!(
        traversal = %config.traversal_policy(),
        stages = ?config.stage_ids(),
        "Pipeline validated"
    );
    Ok(config)
}

/// Decodes one raw stage body, prefixing errors with where the stage sits.
fn decode_stage(
    raw: serde_json::Value,
    location: impl FnOnce() -> String,
) -> Result<StageDocument, ConfigError> {
    serde_json::from_value(raw).map_err(|e| ConfigError::Malformed {
        reason: format!("{}: {e}", location()),
    })
}

fn validate_stage(
    key: Option<String>,
    doc: StageDocument,
    registry: Option<&BTreeMap<String, Endpoint>>,
) -> Result<StageSpec, ConfigError> {
    let id = match (key, doc.id.filter(|id| !id.is_empty())) {
        (Some(key), Some(id)) if key != id => return Err(ConfigError::IdMismatch { key, id }),
        (_, Some(id)) => id,
        (Some(key), None) if !key.is_empty() => key,
        _ => return Err(ConfigError::missing_field(UNNAMED_STAGE, "id")),
    };

    let command = match doc.command {
        None => None,
        Some(CommandDocument::Line(line)) => {
            let argv = command::tokenize(&line).map_err(|e| ConfigError::InvalidField {
                stage_id: id.clone(),
                field: "command".to_string(),
                reason: e.to_string(),
            })?;
            Some(argv)
        }
        Some(CommandDocument::Argv(argv)) => Some(argv),
    }
    .filter(|argv| argv.first().is_some_and(|program| !program.is_empty()));

    let input_file = doc.input_file.filter(|f| !f.is_empty());
    let output_file = doc.output_file.filter(|f| !f.is_empty());
    let registered = registry.is_some_and(|r| r.contains_key(&id));

    // A stage carrying both forms runs remotely only when it has an endpoint.
    let directive = match (command, input_file, output_file) {
        (Some(_), Some(input_file), Some(output_file)) if registered => ExecutionDirective::Files {
            input_file,
            output_file,
            params: doc.params,
        },
        (Some(argv), _, _) => ExecutionDirective::Command { argv },
        (None, Some(input_file), Some(output_file)) => ExecutionDirective::Files {
            input_file,
            output_file,
            params: doc.params,
        },
        (None, None, None) => return Err(ConfigError::missing_field(&id, "command")),
        (None, None, Some(_)) => return Err(ConfigError::missing_field(&id, "input_file")),
        (None, Some(_), None) => return Err(ConfigError::missing_field(&id, "output_file")),
    };

    if let Some(timeout) = doc.timeout_seconds {
        let reason = if !timeout.is_finite() || timeout <= 0.0 {
            Some(format!("must be a positive number of seconds, got {timeout}"))
        } else if Duration::try_from_secs_f64(timeout).is_err() {
            Some(format!("{timeout} seconds is too large for a deadline"))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ConfigError::InvalidField {
                stage_id: id,
                field: "timeout_seconds".to_string(),
                reason,
            });
        }
    }

    Ok(StageSpec {
        id,
        directive,
        next_node: doc.next_node.filter(|n| !n.is_empty()),
        depends_on: doc.depends_on,
        timeout_seconds: doc.timeout_seconds,
    })
}

impl PipelineConfig {
    /// Converts the config back into its file representation.
    ///
    /// Stages are always emitted as an ordered `containers` sequence.
    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        self.try_document().unwrap_or(serde_json::Value::Null)
    }

    fn try_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        let stages = self
            .stages
            .iter()
            .map(|stage| serde_json::to_value(StageDocument::from(stage)))
            .collect::<Result<Vec<_>, _>>()?;
        let document = ConfigDocument {
            name: Some(self.name.clone()).filter(|n| !n.is_empty()),
            start_node: Some(self.start_node.clone()),
            containers: Some(ContainersDocument::List(stages)),
            service_registry: self.service_registry.as_ref().map(|r| {
                r.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
            }),
            data_mount: self.data_mount.clone(),
            data_root: self.data_root.clone(),
            traversal: self.traversal,
        };
        serde_json::to_value(document)
    }

    /// Serializes the config as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.try_document()?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    start_node: Option<String>,
    #[serde(default)]
    containers: Option<ContainersDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_registry: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_mount: Option<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    traversal: Option<TraversalPolicy>,
}

/// Stage bodies stay raw until [`validate`] decodes them one at a time, so a
/// bad field is reported against its stage instead of against the whole list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContainersDocument {
    List(Vec<serde_json::Value>),
    Map(OrderedStages),
}

impl<'de> Deserialize<'de> for ContainersDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContainersVisitor;

        impl<'de> Visitor<'de> for ContainersVisitor {
            type Value = ContainersDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of stages or a mapping from stage id to stage object")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut stages = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(stage) = seq.next_element::<serde_json::Value>()? {
                    stages.push(stage);
                }
                Ok(ContainersDocument::List(stages))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                let mut seen = HashSet::new();
                while let Some((key, stage)) = map.next_entry::<String, serde_json::Value>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate stage key '{key}'")));
                    }
                    pairs.push((key, stage));
                }
                Ok(ContainersDocument::Map(OrderedStages(pairs)))
            }
        }

        deserializer.deserialize_any(ContainersVisitor)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CommandDocument {
    Line(String),
    Argv(Vec<String>),
}

#[derive(Debug, Default, Serialize)]
struct StageDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<CommandDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
    next_node: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<f64>,
}

/// Reads the next map value, naming `field` in any error.
fn stage_field<'de, A, T>(map: &mut A, field: &str) -> Result<T, A::Error>
where
    A: MapAccess<'de>,
    T: Deserialize<'de>,
{
    map.next_value()
        .map_err(|e| de::Error::custom(format!("field `{field}`: {e}")))
}

impl<'de> Deserialize<'de> for StageDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StageVisitor;

        impl<'de> Visitor<'de> for StageVisitor {
            type Value = StageDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a stage object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut doc = StageDocument::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "id" => doc.id = stage_field(&mut map, "id")?,
                        "command" => doc.command = stage_field(&mut map, "command")?,
                        "input_file" => doc.input_file = stage_field(&mut map, "input_file")?,
                        "output_file" => doc.output_file = stage_field(&mut map, "output_file")?,
                        "params" => {
                            doc.params = stage_field::<_, Option<_>>(&mut map, "params")?.unwrap_or_default();
                        }
                        "next_node" => doc.next_node = stage_field(&mut map, "next_node")?,
                        "depends_on" => {
                            doc.depends_on =
                                stage_field::<_, Option<_>>(&mut map, "depends_on")?.unwrap_or_default();
                        }
                        "timeout_seconds" => {
                            doc.timeout_seconds = stage_field(&mut map, "timeout_seconds")?;
                        }
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(StageVisitor)
    }
}

impl From<&StageSpec> for StageDocument {
    fn from(stage: &StageSpec) -> Self {
        let mut doc = Self {
            id: Some(stage.id.clone()),
            next_node: stage.next_node.clone(),
            depends_on: stage.depends_on.clone(),
            timeout_seconds: stage.timeout_seconds,
            ..Self::default()
        };
        match &stage.directive {
            ExecutionDirective::Command { argv } => doc.command = Some(CommandDocument::Argv(argv.clone())),
            ExecutionDirective::Files {
                input_file,
                output_file,
                params,
            } => {
                doc.input_file = Some(input_file.clone());
                doc.output_file = Some(output_file.clone());
                doc.params = params.clone();
            }
        }
        doc
    }
}

/// Keyed raw stages, in the order they appear in the document.
#[derive(Debug)]
struct OrderedStages(Vec<(String, serde_json::Value)>);

impl Serialize for OrderedStages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, stage) in &self.0 {
            map.serialize_entry(key, stage)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(json: &str) -> Result<PipelineConfig, ConfigError> {
        parse_config_json(json)
    }

    const TWO_STAGE: &str = r#"{
        "start_node": "a",
        "containers": [
            {"id": "a", "input_file": "in.csv", "output_file": "mid.bin", "next_node": "b"},
            {"id": "b", "input_file": "mid.bin", "output_file": "out.csv", "next_node": null}
        ],
        "service_registry": {"a": "localhost:50051", "b": "localhost:50052"}
    }"#;

    #[test]
    fn test_parse_list_form() {
        let config = parse(TWO_STAGE).unwrap();
        assert_eq!(config.name(), "pipeline");
        assert_eq!(config.stage_ids(), vec!["a", "b"]);
        assert_eq!(config.start_node(), "a");
        assert_eq!(config.stage("a").unwrap().next_node.as_deref(), Some("b"));
        assert_eq!(config.stage("b").unwrap().next_node, None);
        assert_eq!(config.service_registry().unwrap().len(), 2);
        assert_eq!(config.traversal_policy(), TraversalPolicy::Chain);
    }

    #[test]
    fn test_parse_map_form_preserves_order_and_uses_keys() {
        let config = parse(
            r#"{
                "start_node": "gen",
                "containers": {
                    "gen": {"command": "python3 gen.py --out /data/raw.csv", "next_node": "analyze"},
                    "analyze": {"id": "analyze", "command": ["python3", "analyze.py"], "next_node": "report"},
                    "report": {"command": "python3 report.py"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.stage_ids(), vec!["gen", "analyze", "report"]);
        assert_eq!(
            config.stage("gen").unwrap().directive,
            ExecutionDirective::Command {
                argv: vec!["python3".into(), "gen.py".into(), "--out".into(), "/data/raw.csv".into()]
            }
        );
    }

    #[test]
    fn test_malformed_input() {
        let err = parse("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_empty_pipeline() {
        assert!(matches!(parse(r#"{"start_node": "a"}"#), Err(ConfigError::EmptyPipeline)));
        assert!(matches!(
            parse(r#"{"start_node": "a", "containers": []}"#),
            Err(ConfigError::EmptyPipeline)
        ));
        assert!(matches!(
            parse(r#"{"start_node": "a", "containers": {}}"#),
            Err(ConfigError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_missing_fields() {
        let err = parse(r#"{"start_node": "a", "containers": [{"command": "true"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "id"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "", "command": "true"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "id"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref stage_id, ref field } if stage_id == "a" && field == "command"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "input_file": "in.csv"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "output_file"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "input_file": "", "output_file": "o"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "input_file"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "  "}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "command"));
    }

    #[test]
    fn test_start_node_rules() {
        let err = parse(r#"{"containers": [{"id": "a", "command": "true"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStartNode { ref start_node } if start_node.is_empty()));

        let err = parse(r#"{"start_node": "", "containers": [{"id": "a", "command": "true"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStartNode { .. }));

        let err = parse(r#"{"start_node": "zzz", "containers": [{"id": "a", "command": "true"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStartNode { ref start_node } if start_node == "zzz"));
    }

    #[test]
    fn test_unknown_references() {
        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "true", "next_node": "b"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownReference { ref field, ref target, .. } if field == "next_node" && target == "b"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "true", "depends_on": ["x"]}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownReference { ref field, .. } if field == "depends_on"));
    }

    #[test]
    fn test_missing_endpoint_for_reachable_remote_stage() {
        let err = parse(
            r#"{
                "start_node": "a",
                "containers": [
                    {"id": "a", "input_file": "i", "output_file": "o", "next_node": "b"},
                    {"id": "b", "input_file": "i", "output_file": "o"}
                ],
                "service_registry": {"a": "localhost:50051"}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint { ref stage_id } if stage_id == "b"));
    }

    #[test]
    fn test_unreachable_stage_needs_no_endpoint() {
        let config = parse(
            r#"{
                "start_node": "a",
                "containers": [
                    {"id": "a", "input_file": "i", "output_file": "o"},
                    {"id": "spare", "input_file": "i", "output_file": "o"}
                ],
                "service_registry": {"a": "localhost:50051"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.stage_count(), 2);
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = parse(
            r#"{"start_node": "a", "containers": [{"id": "a", "input_file": "i", "output_file": "o"}],
                "service_registry": {"a": "localhost"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_duplicate_and_mismatched_ids() {
        let err = parse(
            r#"{"start_node": "a", "containers": [{"id": "a", "command": "true"}, {"id": "a", "command": "false"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStage { .. }));

        let err = parse(r#"{"start_node": "a", "containers": {"a": {"id": "b", "command": "true"}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::IdMismatch { .. }));
    }

    #[test]
    fn test_invalid_timeout_and_command() {
        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "true", "timeout_seconds": 0}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "timeout_seconds"));

        let err = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "echo 'oops"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "command"));
    }

    #[test]
    fn test_timeout_too_large_for_duration() {
        for timeout in ["1e300", "1e20"] {
            let err = parse(&format!(
                r#"{{"start_node": "a", "containers": [{{"id": "a", "command": "true", "timeout_seconds": {timeout}}}]}}"#
            ))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "timeout_seconds"));
        }

        let config = parse(
            r#"{"start_node": "a", "containers": [{"id": "a", "command": "true", "timeout_seconds": 86400}]}"#,
        )
        .unwrap();
        assert_eq!(config.stage("a").unwrap().local_timeout(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_malformed_stage_names_field_and_stage() {
        let err = parse(
            r#"{"start_node": "a", "containers": [
                {"id": "a", "command": "true", "next_node": "b"},
                {"id": "b", "command": "true", "timeout_seconds": "soon"}
            ]}"#,
        )
        .unwrap_err();
        let ConfigError::Malformed { reason } = err else {
            panic!("expected malformed config, got {err:?}");
        };
        assert!(reason.contains("containers[1]"), "{reason}");
        assert!(reason.contains("timeout_seconds"), "{reason}");
        assert!(reason.contains("invalid type"), "{reason}");

        let err = parse(r#"{"start_node": "a", "containers": {"a": {"command": "true", "params": {"rows": 100}}}}"#)
            .unwrap_err();
        let ConfigError::Malformed { reason } = err else {
            panic!("expected malformed config, got {err:?}");
        };
        assert!(reason.contains("stage 'a'"), "{reason}");
        assert!(reason.contains("params"), "{reason}");
    }

    #[test]
    fn test_duplicate_map_keys_rejected() {
        let err = parse(r#"{"start_node": "a", "containers": {"a": {"command": "true"}, "a": {"command": "false"}}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { ref reason } if reason.contains("duplicate stage key 'a'")));
    }

    #[test]
    fn test_unknown_stage_fields_are_ignored() {
        let config = parse(r#"{"start_node": "a", "containers": [{"id": "a", "command": "true", "image": "x"}]}"#)
            .unwrap();
        assert_eq!(config.stage_count(), 1);
    }

    #[test]
    fn test_stage_with_both_forms_prefers_endpoint() {
        let json = r#"{
            "start_node": "a",
            "containers": [
                {"id": "a", "command": "python3 a.py", "input_file": "i", "output_file": "o", "next_node": "b"},
                {"id": "b", "command": "python3 b.py", "input_file": "i", "output_file": "o"}
            ],
            "service_registry": {"a": "localhost:50051"}
        }"#;
        let config = parse(json).unwrap();
        assert!(config.stage("a").unwrap().is_remote());
        assert!(!config.stage("b").unwrap().is_remote());
    }

    #[test]
    fn test_round_trip_preserves_chain() {
        let config = parse(TWO_STAGE).unwrap();
        let json = config.to_json_string().unwrap();
        let reloaded = parse(&json).unwrap();

        assert_eq!(reloaded.stage_ids(), config.stage_ids());
        assert_eq!(reloaded.start_node(), config.start_node());
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_yaml_format() {
        let yaml = r"
name: energy
start_node: gen
traversal: dependencies
containers:
  - id: gen
    command: python3 gen.py
  - id: report
    command: [python3, report.py]
    depends_on: [gen]
";
        let config = parse_config_str(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.name(), "energy");
        assert_eq!(config.traversal_policy(), TraversalPolicy::Dependencies);
        assert_eq!(config.stage("report").unwrap().depends_on, vec!["gen".to_string()]);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(TWO_STAGE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        let stem = file.path().file_stem().unwrap().to_str().unwrap();
        assert_eq!(config.name(), stem);
        assert_eq!(config.stage_count(), 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/pipeline.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("p.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("p.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("p.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("p")), ConfigFormat::Json);
    }
}
