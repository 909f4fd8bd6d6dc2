//! Runner configuration
//!
//! Built once at startup and shared read-only by every request.

use luma_sandbox::{ProcessRunner, ProcessSpec};
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted submission, in characters
pub const DEFAULT_MAX_CODE_CHARS: usize = 10_000;
/// Lines that look like `while true` before a submission is refused
pub const DEFAULT_MAX_UNBOUNDED_LOOPS: usize = 3;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 5_000;
pub const DEFAULT_MAX_ERROR_CHARS: usize = 1_000;

// One character can be escaped as a surrogate pair in JSON: `\uXXXX\uXXXX`
const JSON_BYTES_PER_CHAR: usize = 12;
const JSON_ENVELOPE_BYTES: usize = 4 * 1024;
// Raw bytes kept per output character, before diagnostics are stripped
const CAPTURE_BYTES_PER_CHAR: usize = 16;

/// Named bundles of defaults, one per way the runner has been deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Fixed interpreter path, short timeout, screening and benchmark output on
    Lean,
    /// Rebuilds the interpreter before each run, longer timeout, no loop screening
    Permissive,
}

/// Command that (re)builds the interpreter before a run
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl BuildStep {
    /// `cargo build --release` in `working_dir`, one minute limit
    pub fn cargo_release(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("cargo"),
            args: vec!["build".to_string(), "--release".to_string()],
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub(crate) fn spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(&self.program)
            .current_dir(&self.working_dir)
            .timeout(self.timeout);
        for arg in &self.args {
            spec = spec.arg(arg);
        }
        // cargo needs to find rustc and its home directory
        for key in ["PATH", "HOME", "CARGO_HOME", "RUSTUP_HOME"] {
            if let Ok(value) = std::env::var(key) {
                spec = spec.env(key, value);
            }
        }
        spec
    }
}

/// Everything the pipeline needs to know about limits and the interpreter
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub interpreter: PathBuf,
    pub artifact_dir: PathBuf,
    pub extension: String,
    pub timeout: Duration,
    pub max_code_chars: usize,
    pub max_unbounded_loops: usize,
    pub max_output_chars: usize,
    pub max_error_chars: usize,
    /// Apply the while/true loop check before running anything
    pub screening: bool,
    /// Ask the interpreter for its diagnostic timing block
    pub benchmark_mode: bool,
    /// Append the processing-time line to successful output
    pub annotate_performance: bool,
    pub build: Option<BuildStep>,
}

impl RunnerConfig {
    pub fn new(profile: Profile, interpreter: impl Into<PathBuf>) -> Self {
        let lean = profile == Profile::Lean;
        Self {
            interpreter: interpreter.into(),
            artifact_dir: std::env::temp_dir(),
            extension: "luma".to_string(),
            timeout: Duration::from_secs(if lean { 15 } else { 30 }),
            max_code_chars: DEFAULT_MAX_CODE_CHARS,
            max_unbounded_loops: DEFAULT_MAX_UNBOUNDED_LOOPS,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            max_error_chars: DEFAULT_MAX_ERROR_CHARS,
            screening: lean,
            benchmark_mode: lean,
            annotate_performance: lean,
            build: None,
        }
    }

    pub fn lean(interpreter: impl Into<PathBuf>) -> Self {
        Self::new(Profile::Lean, interpreter)
    }

    pub fn permissive(interpreter: impl Into<PathBuf>) -> Self {
        Self::new(Profile::Permissive, interpreter)
    }

    /// Largest request body that could still hold an acceptable submission
    pub fn body_limit(&self) -> usize {
        self.max_code_chars
            .saturating_mul(JSON_BYTES_PER_CHAR)
            .saturating_add(JSON_ENVELOPE_BYTES)
    }

    /// Bytes kept from each of the interpreter's output streams
    pub fn capture_limit(&self) -> u64 {
        let chars = self.max_output_chars.max(self.max_error_chars);
        chars.saturating_mul(CAPTURE_BYTES_PER_CHAR) as u64
    }

    /// The sandbox runner these settings describe
    pub fn process_runner(&self) -> ProcessRunner {
        let runner = ProcessRunner::new(&self.interpreter)
            .with_timeout(self.timeout)
            .with_artifact_dir(&self.artifact_dir)
            .with_extension(&self.extension)
            .with_capture_limit(self.capture_limit())
            .with_env("RUST_BACKTRACE", "0");
        if self.benchmark_mode {
            runner.with_env("LUMA_BENCHMARK", "1")
        } else {
            runner
        }
    }
}
