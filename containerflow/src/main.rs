//! Containerflow CLI entry point.
//!
//! Exit codes: 0 when the run completes, 1 on configuration errors, 2 when a
//! stage halts the run or the engine aborts.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use containerflow::config::{load_config, PipelineConfig};
use containerflow::engine::{detect_dependency_cycles, plan, WorkflowEngine};
use containerflow::errors::ConfigError;
use containerflow::observability::init_logging;
use containerflow::settings::{
    LoggingSettings, DEFAULT_CONFIG_PATH, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL,
    PIPELINE_CONFIG_ENV,
};
use containerflow::testing::{StubReply, StubStageServer};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_CONFIG: u8 = 1;
const EXIT_FAILED: u8 = 2;

/// Runs pipelines of local and remote container stages.
#[derive(Parser, Debug)]
#[command(name = "containerflow")]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a pipeline.
    Run(RunArgs),
    /// Validate a pipeline and print its execution order.
    Check(CheckArgs),
    /// Serve a stub stage service for smoke tests.
    ///
    /// The stub reads one request per connection and only understands
    /// bodies sized by `Content-Length`. A request without that header is
    /// treated as having an empty body, and chunked transfer encoding is not
    /// supported. Use it with containerflow's own client, not as a general
    /// HTTP server.
    StubServer(StubServerArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Pipeline config file (JSON, or YAML by extension).
    #[arg(env = PIPELINE_CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for the JSON execution log.
    #[arg(long, env = "LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Log file name inside the log directory.
    #[arg(long, env = "LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: String,

    /// Log level; `RUST_LOG` takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Pipeline config file (JSON, or YAML by extension).
    #[arg(env = PIPELINE_CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct StubServerArgs {
    /// Port to listen on.
    #[arg(long, default_value_t = 50051)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Answer every request with `success = false` and this message.
    #[arg(long)]
    fail_with: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => run(args).await,
            Commands::Check(args) => check(&args),
            Commands::StubServer(args) => stub_server(args).await,
        }
    });

    result.unwrap_or_else(|e| {
        eprintln!("error: {e:#}");
        ExitCode::from(EXIT_FAILED)
    })
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let settings = LoggingSettings {
        log_dir: args.log_dir,
        log_file: args.log_file,
        log_level: args.log_level,
        stdout: true,
    };
    let log_path = init_logging(&settings).context("failed to initialize logging")?;
    info!(log_file = %log_path.display(), config = %args.config.display(), "Starting containerflow");

    let Some(config) = load_or_report(&args.config) else {
        return Ok(ExitCode::from(EXIT_CONFIG));
    };

    let engine = WorkflowEngine::from_config(config);
    match engine.run().await {
        Ok(report) => {
            if let Some(path) = &args.report {
                let json = serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
                std::fs::write(path, json)
                    .with_context(|| format!("failed to write run report to '{}'", path.display()))?;
            }
            match &report.failure {
                None => Ok(ExitCode::SUCCESS),
                Some(failure) => {
                    eprintln!("error: {failure}");
                    Ok(ExitCode::from(EXIT_FAILED))
                }
            }
        }
        Err(e) => {
            let info = e.error_info();
            eprintln!("error [{}]: {e}", info.code);
            if let Some(hint) = &info.fix_hint {
                eprintln!("hint: {hint}");
            }
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn check(args: &CheckArgs) -> Result<ExitCode> {
    let Some(config) = load_or_report(&args.config) else {
        return Ok(ExitCode::from(EXIT_CONFIG));
    };

    if let Some(cycle) = detect_dependency_cycles(&config) {
        eprintln!("error [{}]: {cycle}", cycle.error_info.code);
        return Ok(ExitCode::from(EXIT_CONFIG));
    }

    match plan(&config) {
        Ok(order) => {
            print_plan(&config, &order);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("error [{}]: {e}", e.error_info().code);
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn print_plan(config: &PipelineConfig, order: &[String]) {
    println!(
        "pipeline '{}' ({} traversal, {} stages)",
        config.name(),
        config.traversal_policy(),
        config.stage_count()
    );
    for (i, id) in order.iter().enumerate() {
        let transport = config.stage(id).map_or("?", |s| s.directive.transport());
        println!("{:>3}. {id} [{transport}]", i + 1);
    }
}

async fn stub_server(args: StubServerArgs) -> Result<ExitCode> {
    init_logging(&LoggingSettings::from_env()).context("failed to initialize logging")?;
    let reply = args.fail_with.map_or(StubReply::Succeed, StubReply::Fail);
    let server = StubStageServer::bind(&format!("{}:{}", args.host, args.port), reply)
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    println!("stub stage service listening on {}", server.local_addr());

    tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
    info!("Stub stage service shutting down");
    Ok(ExitCode::SUCCESS)
}

fn load_or_report(path: &Path) -> Option<PipelineConfig> {
    match load_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            report_config_error(&e);
            None
        }
    }
}

fn report_config_error(err: &ConfigError) {
    let info = err.error_info();
    error!(code = %info.code, error = %err, "Configuration error");
    eprintln!("error [{}]: {err}", info.code);
    if let Some(hint) = &info.fix_hint {
        eprintln!("hint: {hint}");
    }
}
