//! Remote dispatch over the HTTP/JSON execute contract.

use super::outcome::{codes, ExecutionOutcome};
use super::wire::{ExecuteRequest, ExecuteResponse};
use super::Dispatcher;
use crate::config::{ExecutionDirective, StageSpec};
use crate::registry::Endpoint;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Calls stage services, opening a fresh connection for every call.
#[derive(Debug, Clone, Default)]
pub struct RemoteDispatcher {
    data_root: Option<String>,
}

impl RemoteDispatcher {
    /// Creates a dispatcher that sends file paths unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix joined to relative file paths.
    #[must_use]
    pub fn with_data_root(mut self, root: Option<String>) -> Self {
        self.data_root = root;
        self
    }

    /// Builds the request body for a stage.
    #[must_use]
    pub fn build_request(&self, stage: &StageSpec) -> Option<ExecuteRequest> {
        match &stage.directive {
            ExecutionDirective::Files {
                input_file,
                output_file,
                params,
            } => Some(ExecuteRequest {
                input_file: self.resolve_path(input_file),
                output_file: self.resolve_path(output_file),
                params: params.clone(),
            }),
            ExecutionDirective::Command { .. } => None,
        }
    }

    fn resolve_path(&self, file: &str) -> String {
        match &self.data_root {
            Some(root) if Path::new(file).is_relative() => {
                Path::new(root).join(file).to_string_lossy().into_owned()
            }
            _ => file.to_string(),
        }
    }

    async fn call(&self, stage: &StageSpec, endpoint: &Endpoint, request: &ExecuteRequest) -> ExecutionOutcome {
        let timeout = stage.remote_timeout();
        let url = endpoint.execute_url();
        debug!(stage = %stage.id, url = %url, timeout_s = timeout.as_secs_f64(), "Calling stage service");

        let client = match Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
        {
            Ok(client) => client,
            Err(e) => return ExecutionOutcome::failed_with_code(codes::INTERNAL, e.to_string()),
        };

        let response = match client.post(&url).json(request).send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(&e, endpoint, timeout.as_secs_f64()),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return transport_failure(&e, endpoint, timeout.as_secs_f64()),
        };

        if !status.is_success() {
            return ExecutionOutcome::failed_with_code(
                codes::INTERNAL,
                format!("stage service at {endpoint} returned HTTP {status}: {}", body.trim()),
            );
        }

        match serde_json::from_str::<ExecuteResponse>(&body) {
            Ok(reply) if reply.success => ExecutionOutcome::ok(reply.message),
            Ok(reply) => ExecutionOutcome::failed(reply.message),
            Err(e) => ExecutionOutcome::failed_with_code(
                codes::INVALID_RESPONSE,
                format!("stage service at {endpoint} sent an unreadable response: {e}"),
            ),
        }
    }
}

fn transport_failure(error: &reqwest::Error, endpoint: &Endpoint, timeout_s: f64) -> ExecutionOutcome {
    if error.is_timeout() {
        ExecutionOutcome::failed_with_code(
            codes::DEADLINE_EXCEEDED,
            format!("call to {endpoint} exceeded its {timeout_s:.1}s deadline"),
        )
    } else if error.is_connect() {
        ExecutionOutcome::failed_with_code(codes::UNAVAILABLE, format!("could not reach {endpoint}: {error}"))
    } else {
        ExecutionOutcome::failed_with_code(codes::INTERNAL, format!("call to {endpoint} failed: {error}"))
    }
}

#[async_trait]
impl Dispatcher for RemoteDispatcher {
    async fn execute<'a>(&self, stage: &StageSpec, endpoint: Option<&'a Endpoint>) -> ExecutionOutcome {
        let started = Instant::now();
        let Some(request) = self.build_request(stage) else {
            return ExecutionOutcome::failed_with_code(
                codes::INTERNAL,
                format!("stage '{}' has no input/output files to send", stage.id),
            );
        };
        let Some(endpoint) = endpoint else {
            return ExecutionOutcome::failed_with_code(
                codes::NO_ENDPOINT,
                format!("no endpoint given for remote stage '{}'", stage.id),
            );
        };

        let outcome = self.call(stage, endpoint, &request).await.with_duration(started.elapsed());
        if outcome.success {
            info!(
                stage = %stage.id,
                endpoint = %endpoint,
                duration_ms = outcome.duration_ms(),
                "Stage service call succeeded"
            );
        } else {
            warn!(
                stage = %stage.id,
                endpoint = %endpoint,
                error_code = ?outcome.error_code,
                message = %outcome.message,
                "Stage service call failed"
            );
        }
        outcome
    }
}
