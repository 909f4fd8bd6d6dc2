//! Luma Sandbox - bounded interpreter execution
//!
//! Every submission is written to a throwaway artifact and handed to the
//! interpreter as a child process. The child gets a cleared environment,
//! a null stdin and a hard wall-clock limit. That is all: there is no
//! namespace, cgroup or filesystem jail here.

mod artifact;
mod process;

pub use artifact::Artifact;
pub use process::{run_process, ProcessOutcome, ProcessRunner, ProcessSpec, Termination};

/// Errors from sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to prepare source artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
