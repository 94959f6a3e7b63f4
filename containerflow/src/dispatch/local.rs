//! Local subprocess dispatch.

use super::command::build_argv;
use super::outcome::{codes, ExecutionOutcome};
use super::Dispatcher;
use crate::config::{ExecutionDirective, StageSpec, VolumeMount};
use crate::registry::Endpoint;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs stages as child processes and waits for them to exit.
#[derive(Debug, Clone, Default)]
pub struct LocalDispatcher {
    data_mount: Option<VolumeMount>,
}

impl LocalDispatcher {
    /// Creates a dispatcher without a volume mount.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mount injected into container-runtime commands.
    #[must_use]
    pub fn with_data_mount(mut self, mount: Option<VolumeMount>) -> Self {
        self.data_mount = mount;
        self
    }

    /// Runs `argv` to completion, or until `stage`'s timeout expires.
    pub async fn run_argv(&self, stage: &StageSpec, argv: &[String]) -> ExecutionOutcome {
        let started = Instant::now();
        let argv = build_argv(argv, self.data_mount.as_ref());
        let Some((program, args)) = argv.split_first() else {
            return ExecutionOutcome::failed_with_code(codes::SPAWN_FAILED, "empty command");
        };

        debug!(stage = %stage.id, argv = ?argv, "Spawning local process");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = %stage.id, program = %program, error = %e, "Failed to spawn process");
                return ExecutionOutcome::failed_with_code(
                    codes::SPAWN_FAILED,
                    format!("failed to start '{program}': {e}"),
                )
                .with_duration(started.elapsed());
            }
        };

        let output = match stage.local_timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(stage = %stage.id, timeout_s = limit.as_secs_f64(), "Process timed out and was killed");
                    return ExecutionOutcome::failed_with_code(
                        codes::TIMEOUT,
                        format!("timed out after {:.1}s", limit.as_secs_f64()),
                    )
                    .with_duration(started.elapsed());
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return ExecutionOutcome::failed_with_code(
                    codes::SPAWN_FAILED,
                    format!("failed waiting for '{program}': {e}"),
                )
                .with_duration(started.elapsed());
            }
        };

        let duration = started.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let outcome = if output.status.success() {
            ExecutionOutcome::ok(String::new()).with_exit_code(0)
        } else {
            let message = match (stderr.trim(), output.status.code()) {
                (err, _) if !err.is_empty() => err.to_string(),
                (_, Some(code)) => format!("exited with status {code}"),
                (_, None) => "terminated by signal".to_string(),
            };
            let failed = ExecutionOutcome::failed_with_code(codes::NONZERO_EXIT, message);
            match output.status.code() {
                Some(code) => failed.with_exit_code(code),
                None => failed,
            }
        };

        info!(
            stage = %stage.id,
            returncode = ?output.status.code(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Local process exited"
        );

        outcome.with_output(stdout, stderr).with_duration(duration)
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn execute<'a>(&self, stage: &StageSpec, _endpoint: Option<&'a Endpoint>) -> ExecutionOutcome {
        match &stage.directive {
            ExecutionDirective::Command { argv } => self.run_argv(stage, argv).await,
            ExecutionDirective::Files { .. } => ExecutionOutcome::failed_with_code(
                codes::SPAWN_FAILED,
                format!("stage '{}' has no command to run locally", stage.id),
            ),
        }
    }
}
