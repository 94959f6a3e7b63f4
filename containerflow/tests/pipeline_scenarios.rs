//! End-to-end runs against stub stage services and local processes.

use containerflow::config::{load_config, parse_config_json, PipelineConfig};
use containerflow::dispatch::{codes, StageDispatcher};
use containerflow::engine::{RunState, WorkflowEngine};
use containerflow::errors::{ConfigError, EngineError};
use containerflow::events::{kinds, CollectingEventSink};
use containerflow::registry::ServiceRegistry;
use containerflow::testing::{ScriptedDispatcher, StubReply, StubStageServer};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn remote_chain(a: &StubStageServer, b: &StubStageServer) -> PipelineConfig {
    parse_config_json(&format!(
        r#"{{
            "start_node": "a",
            "containers": [
                {{"id": "a", "input_file": "in.csv", "output_file": "mid.bin", "next_node": "b"}},
                {{"id": "b", "input_file": "mid.bin", "output_file": "out.csv", "next_node": null}}
            ],
            "service_registry": {{"a": "{}", "b": "{}"}}
        }}"#,
        a.endpoint(),
        b.endpoint()
    ))
    .unwrap()
}

fn engine_with_sink(config: PipelineConfig) -> (WorkflowEngine, Arc<CollectingEventSink>) {
    let registry = ServiceRegistry::from_config(&config);
    let dispatcher = Arc::new(StageDispatcher::for_config(&config));
    let sink = Arc::new(CollectingEventSink::new());
    let engine = WorkflowEngine::new(config, registry, dispatcher, sink.clone());
    (engine, sink)
}

fn terminal_count(sink: &CollectingEventSink) -> usize {
    sink.types().iter().filter(|t| kinds::is_terminal(t)).count()
}

#[tokio::test]
async fn remote_chain_completes_in_order() {
    let a = StubStageServer::start(StubReply::Succeed).await.unwrap();
    let b = StubStageServer::start(StubReply::Succeed).await.unwrap();
    let (engine, sink) = engine_with_sink(remote_chain(&a, &b));

    let report = engine.run().await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.visited(), vec!["a", "b"]);
    assert_eq!(a.requests().len(), 1);
    assert_eq!(a.requests()[0].input_file, "in.csv");
    assert_eq!(b.requests()[0].output_file, "out.csv");
    assert_eq!(terminal_count(&sink), 1);
    assert_eq!(sink.types().last().map(String::as_str), Some("run.completed"));
}

#[tokio::test]
async fn remote_failure_halts_and_skips_successor() {
    let a = StubStageServer::start(StubReply::Fail("bad input".to_string())).await.unwrap();
    let b = StubStageServer::start(StubReply::Succeed).await.unwrap();
    let (engine, sink) = engine_with_sink(remote_chain(&a, &b));

    let report = engine.run().await.unwrap();

    assert_eq!(report.state, RunState::Halted);
    assert_eq!(report.visited(), vec!["a"]);
    let failure = report.failure.unwrap();
    assert_eq!(failure.stage_id, "a");
    assert_eq!(failure.message, "bad input");
    assert!(b.requests().is_empty());
    assert_eq!(terminal_count(&sink), 1);
    assert_eq!(sink.types().last().map(String::as_str), Some("run.halted"));
}

#[tokio::test]
async fn remote_deadline_becomes_failure_outcome() {
    let a = StubStageServer::start(StubReply::Delay(Duration::from_secs(5))).await.unwrap();
    let config = parse_config_json(&format!(
        r#"{{"start_node": "a",
            "containers": [{{"id": "a", "input_file": "i", "output_file": "o", "timeout_seconds": 0.3}}],
            "service_registry": {{"a": "{}"}}}}"#,
        a.endpoint()
    ))
    .unwrap();
    let (engine, _sink) = engine_with_sink(config);

    let report = engine.run().await.unwrap();

    let failure = report.failure.unwrap();
    assert_eq!(failure.error_code.as_deref(), Some(codes::DEADLINE_EXCEEDED));
}

#[tokio::test]
async fn remote_server_error_and_bad_body_are_normalized() {
    let broken = StubStageServer::start(StubReply::Status(500)).await.unwrap();
    let garbled = StubStageServer::start(StubReply::Garbage).await.unwrap();

    for (server, expected) in [(&broken, codes::INTERNAL), (&garbled, codes::INVALID_RESPONSE)] {
        let config = parse_config_json(&format!(
            r#"{{"start_node": "a",
                "containers": [{{"id": "a", "input_file": "i", "output_file": "o"}}],
                "service_registry": {{"a": "{}"}}}}"#,
            server.endpoint()
        ))
        .unwrap();
        let (engine, _sink) = engine_with_sink(config);
        let report = engine.run().await.unwrap();
        assert_eq!(report.failure.unwrap().error_code.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn data_root_prefixes_remote_paths() {
    let a = StubStageServer::start(StubReply::Succeed).await.unwrap();
    let config = parse_config_json(&format!(
        r#"{{"start_node": "a", "data_root": "/srv/data",
            "containers": [{{"id": "a", "input_file": "raw.csv", "output_file": "/tmp/out.csv",
                            "params": {{"rows": "100"}}}}],
            "service_registry": {{"a": "{}"}}}}"#,
        a.endpoint()
    ))
    .unwrap();
    let (engine, _sink) = engine_with_sink(config);

    engine.run().await.unwrap();

    let request = &a.requests()[0];
    assert_eq!(request.input_file, "/srv/data/raw.csv");
    assert_eq!(request.output_file, "/tmp/out.csv");
    assert_eq!(request.params.get("rows").map(String::as_str), Some("100"));
}

#[tokio::test]
async fn cyclic_chain_is_detected_before_redispatch() {
    let config = parse_config_json(
        r#"{"start_node": "a", "containers": [
            {"id": "a", "command": "true", "next_node": "b"},
            {"id": "b", "command": "true", "next_node": "a"}
        ]}"#,
    )
    .unwrap();
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let sink = Arc::new(CollectingEventSink::new());
    let engine = WorkflowEngine::new(config, ServiceRegistry::new(), dispatcher.clone(), sink.clone());

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::Cycle(ref c) if c.stage() == "a"));
    assert_eq!(dispatcher.calls(), vec!["a", "b"]);
    assert_eq!(dispatcher.call_count("a"), 1);
    assert_eq!(sink.types().last().map(String::as_str), Some("run.failed"));
    assert_eq!(terminal_count(&sink), 1);
}

#[test]
fn unknown_start_node_fails_at_load() {
    let err = parse_config_json(r#"{"start_node": "zzz", "containers": [{"id": "a", "command": "true"}]}"#)
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownStartNode { .. }));
}

#[tokio::test]
async fn repeated_runs_produce_equivalent_reports() {
    let config = parse_config_json(
        r#"{"start_node": "a", "containers": [
            {"id": "a", "command": "true", "next_node": "b"},
            {"id": "b", "command": "true"}
        ]}"#,
    )
    .unwrap();
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let engine = WorkflowEngine::new(
        config,
        ServiceRegistry::new(),
        dispatcher.clone(),
        Arc::new(CollectingEventSink::new()),
    );

    let first = engine.run().await.unwrap();
    let second = engine.run().await.unwrap();

    assert_eq!(first.state, second.state);
    assert_eq!(first.visited(), second.visited());
    assert_eq!(
        first.stages.iter().map(|r| &r.outcome.message).collect::<Vec<_>>(),
        second.stages.iter().map(|r| &r.outcome.message).collect::<Vec<_>>()
    );
    assert_eq!(dispatcher.calls(), vec!["a", "b", "a", "b"]);
}

#[test]
fn round_trip_preserves_ids_start_and_chain() {
    let original = parse_config_json(
        r#"{"start_node": "gen", "containers": {
            "gen": {"command": "python3 gen.py", "next_node": "analyze"},
            "analyze": {"input_file": "raw.csv", "output_file": "stats.json", "next_node": "report"},
            "report": {"command": ["python3", "report.py", "--format", "html page"]}
        }, "service_registry": {"analyze": "localhost:50052"}}"#,
    )
    .unwrap();

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(original.to_json_string().unwrap().as_bytes()).unwrap();
    let reloaded = load_config(file.path()).unwrap();

    assert_eq!(reloaded.stage_ids(), original.stage_ids());
    assert_eq!(reloaded.start_node(), original.start_node());
    for id in original.stage_ids() {
        assert_eq!(reloaded.stage(id), original.stage(id));
    }
}

#[cfg(unix)]
mod local {
    use super::*;
    use pretty_assertions::assert_eq;

    fn local_pipeline(first: &str, second: &str) -> PipelineConfig {
        parse_config_json(&format!(
            r#"{{"start_node": "first", "containers": [
                {{"id": "first", "command": {first}, "next_node": "second"}},
                {{"id": "second", "command": {second}}}
            ]}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn local_chain_completes() {
        let (engine, _sink) = engine_with_sink(local_pipeline(r#""sh -c 'echo one'""#, r#"["true"]"#));
        let report = engine.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.stages[0].outcome.stdout.trim(), "one");
        assert_eq!(report.stages[0].transport, "local");
    }

    #[tokio::test]
    async fn local_failure_reports_stderr_and_exit_code() {
        let (engine, sink) = engine_with_sink(local_pipeline(
            r#""sh -c 'echo missing column >&2; exit 4'""#,
            r#"["true"]"#,
        ));
        let report = engine.run().await.unwrap();

        assert_eq!(report.state, RunState::Halted);
        assert_eq!(report.visited(), vec!["first"]);
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage_id, "first");
        assert_eq!(failure.message, "missing column");
        assert_eq!(failure.exit_code, Some(4));
        assert_eq!(failure.error_code.as_deref(), Some(codes::NONZERO_EXIT));
        assert_eq!(sink.events_of_type("stage.failed").len(), 1);
    }
}

#[test]
fn bundled_configs_load_and_plan() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");

    let remote = load_config(root.join("pipeline.json")).unwrap();
    assert_eq!(remote.name(), "energy");
    assert_eq!(
        containerflow::engine::plan(&remote).unwrap(),
        vec!["energy_generator", "energy_analyzer", "report_generator"]
    );

    let local = load_config(root.join("pipeline.local.yaml")).unwrap();
    assert_eq!(local.stage_ids(), vec!["generate", "analyze", "report"]);
    assert!(local.data_mount().is_some());
}
