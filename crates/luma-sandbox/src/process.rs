//! Child process execution under a wall-clock limit

use crate::{Artifact, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long pipe readers may keep going once the child is gone.
/// A grandchild that inherited stdout can hold the pipe open forever.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// How a child process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with this status code
    Exited(i32),
    /// Killed by a signal we did not send
    Signaled,
    /// Ran past the wall-clock limit and was killed
    TimedOut,
    /// Never started (missing or unrunnable executable)
    LaunchFailed(String),
}

/// Everything observed about one child process run
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Exit status 0
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    fn launch_failed(message: String, elapsed: Duration) -> Self {
        Self {
            termination: Termination::LaunchFailed(message),
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
        }
    }
}

/// A fully described command: program, arguments, environment and limit.
///
/// The environment is never inherited; only `env` entries reach the child.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Bytes kept per output stream; the rest is read and discarded
    pub capture_limit: Option<u64>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(30),
            capture_limit: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn capture_limit(mut self, bytes: u64) -> Self {
        self.capture_limit = Some(bytes);
        self
    }
}

/// Run a command to completion or until its time limit.
///
/// Never fails: launch errors, timeouts and bad exits all come back as a
/// [`Termination`]. On timeout the child is killed and reaped before this
/// returns.
pub async fn run_process(spec: &ProcessSpec) -> ProcessOutcome {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %spec.program.display(), error = %e, "failed to launch");
            return ProcessOutcome::launch_failed(e.to_string(), start.elapsed());
        }
    };

    let stdout = tokio::spawn(drain(child.stdout.take(), spec.capture_limit));
    let stderr = tokio::spawn(drain(child.stderr.take(), spec.capture_limit));

    let termination = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => match status.code() {
            Some(code) => Termination::Exited(code),
            None => Termination::Signaled,
        },
        Ok(Err(e)) => Termination::LaunchFailed(format!("failed to wait for child: {}", e)),
        Err(_) => {
            // kill() sends SIGKILL and waits, so the child is reaped here
            if let Err(e) = child.kill().await {
                tracing::warn!(program = %spec.program.display(), error = %e, "failed to kill timed out child");
            }
            tracing::warn!(
                program = %spec.program.display(),
                timeout_ms = spec.timeout.as_millis() as u64,
                "child timed out"
            );
            Termination::TimedOut
        }
    };
    let elapsed = start.elapsed();

    ProcessOutcome {
        termination,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
        elapsed,
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, limit: Option<u64>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let read = match limit {
            Some(limit) => read_capped(&mut pipe, limit, &mut buf).await,
            None => pipe.read_to_end(&mut buf).await.map(|_| ()),
        };
        if let Err(e) = read {
            tracing::debug!(error = %e, "pipe read failed");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// Keep the first `limit` bytes, then keep the pipe empty so the child
// never stalls on a full buffer
async fn read_capped<R: AsyncRead + Unpin>(
    pipe: &mut R,
    limit: u64,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    (&mut *pipe).take(limit).read_to_end(buf).await?;
    let discarded = tokio::io::copy(pipe, &mut tokio::io::sink()).await?;
    if discarded > 0 {
        tracing::debug!(kept = limit, discarded, "output capture limit reached");
    }
    Ok(())
}

async fn collect(mut reader: JoinHandle<String>) -> String {
    match tokio::time::timeout(PIPE_GRACE, &mut reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "pipe reader failed");
            String::new()
        }
        Err(_) => {
            reader.abort();
            String::new()
        }
    }
}

/// Runs submitted source through an interpreter executable.
///
/// One call = one artifact + one child process, nothing shared.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interpreter: PathBuf,
    env: Vec<(String, String)>,
    timeout: Duration,
    artifact_dir: PathBuf,
    extension: String,
    capture_limit: Option<u64>,
}

impl ProcessRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            env: Vec::new(),
            timeout: Duration::from_secs(15),
            artifact_dir: std::env::temp_dir(),
            extension: "luma".to_string(),
            capture_limit: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_capture_limit(mut self, bytes: u64) -> Self {
        self.capture_limit = Some(bytes);
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn capture_limit(&self) -> Option<u64> {
        self.capture_limit
    }

    /// Write `source` to a fresh artifact and run `interpreter <artifact>`.
    ///
    /// The artifact is gone by the time this returns, whatever happened.
    pub async fn run_source(&self, source: &str) -> Result<ProcessOutcome> {
        let artifact = Artifact::create(&self.artifact_dir, &self.extension, source)?;

        let mut spec = ProcessSpec::new(&self.interpreter)
            .arg(artifact.path())
            .timeout(self.timeout);
        spec.env = self.env.clone();
        spec.capture_limit = self.capture_limit;

        let outcome = run_process(&spec).await;
        drop(artifact);
        Ok(outcome)
    }
}
