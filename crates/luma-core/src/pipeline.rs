//! Request-to-execution pipeline
//!
//! Guard → optional build → sandbox → output processor. Every failure is
//! terminal for its request and comes back as an [`ExecutionResult`]; there
//! are no retries.

use crate::config::{BuildStep, RunnerConfig};
use crate::guard::{self, GuardRejection, GuardVerdict};
use crate::output;
use crate::result::{ExecutionRequest, ExecutionResult};
use crate::RunError;
use luma_sandbox::{run_process, Termination};

/// Parse a raw request body and run it
pub async fn run_request(config: &RunnerConfig, body: &[u8]) -> ExecutionResult {
    let request: ExecutionRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "malformed request body");
            return RunError::MalformedRequest(e.to_string()).into();
        }
    };
    run_submission(config, &request.code).await
}

/// Answer for a request body too large to even read.
///
/// No body past [`RunnerConfig::body_limit`] can hold an acceptable
/// submission, so it gets the same rejection as an over-long `code`.
pub fn oversized_request(config: &RunnerConfig) -> ExecutionResult {
    let reason = GuardRejection::TooLong {
        length: config.max_code_chars + 1,
        max: config.max_code_chars,
    };
    tracing::warn!(limit_bytes = config.body_limit(), "request body over limit");
    RunError::Rejected(reason).into()
}

/// Run one submission through the whole pipeline
pub async fn run_submission(config: &RunnerConfig, code: &str) -> ExecutionResult {
    match execute(config, code).await {
        Ok(result) => {
            tracing::info!(
                success = result.success,
                execution_time_ms = result.execution_time_ms,
                "submission finished"
            );
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "submission failed before producing output");
            e.into()
        }
    }
}

async fn execute(config: &RunnerConfig, code: &str) -> Result<ExecutionResult, RunError> {
    let source = match guard::screen(code, config) {
        GuardVerdict::Empty => return Ok(ExecutionResult::empty_submission()),
        GuardVerdict::Rejected(reason) => return Err(RunError::Rejected(reason)),
        GuardVerdict::Accepted(source) => source,
    };

    if let Some(build) = &config.build {
        run_build(build).await?;
    }

    let outcome = config.process_runner().run_source(source).await?;
    tracing::debug!(
        termination = ?outcome.termination,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        stdout_bytes = outcome.stdout.len(),
        stderr_bytes = outcome.stderr.len(),
        "interpreter finished"
    );
    Ok(output::process_outcome(&outcome, config))
}

async fn run_build(build: &BuildStep) -> Result<(), RunError> {
    let outcome = run_process(&build.spec()).await;
    match outcome.termination {
        Termination::Exited(0) => Ok(()),
        Termination::TimedOut => Err(RunError::BuildTimedOut(build.timeout.as_secs())),
        Termination::LaunchFailed(reason) => Err(RunError::Build(reason)),
        Termination::Exited(_) | Termination::Signaled => {
            Err(RunError::Build(outcome.stderr.trim().to_string()))
        }
    }
}
