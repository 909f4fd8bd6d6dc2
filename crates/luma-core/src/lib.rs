//! Luma Core - screening, execution pipeline and output cleanup
//!
//! This crate holds every policy decision of the runner: what to refuse,
//! how long to wait, what to strip from interpreter output and how to
//! report timing. Frontends (the HTTP server today) only move bytes.

pub mod config;
pub mod guard;
pub mod output;
pub mod pipeline;
pub mod result;

pub use config::{BuildStep, Profile, RunnerConfig};
pub use guard::{GuardRejection, GuardVerdict};
pub use pipeline::{oversized_request, run_request, run_submission};
pub use result::{ExecutionRequest, ExecutionResult};

use luma_sandbox::SandboxError;

/// Failures that end a request before the interpreter produces a result.
///
/// Timeouts, launch failures and bad exits are not here: they are process
/// outcomes and the output processor reports them.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Rejected(#[from] GuardRejection),

    #[error("Invalid JSON in request: {0}")]
    MalformedRequest(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Build timed out after {0} seconds")]
    BuildTimedOut(u64),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl From<RunError> for ExecutionResult {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Sandbox(e) => ExecutionResult::server_error(e),
            other => ExecutionResult::failed(other.to_string(), None),
        }
    }
}
