//! Output classification and cleanup
//!
//! Turns a raw [`ProcessOutcome`] into the text and timing the caller sees.
//! In benchmark mode the interpreter interleaves its own diagnostic block
//! with program output; [`DiagnosticFilter`] strips it.

use crate::config::RunnerConfig;
use crate::result::{ExecutionResult, EMPTY_OUTPUT_MESSAGE};
use luma_sandbox::{ProcessOutcome, Termination};
use once_cell::sync::Lazy;
use regex::Regex;

/// Line prefixes the interpreter uses for its benchmark block
pub const DIAGNOSTIC_MARKERS: &[&str] = &[
    "===",
    "File I/O",
    "Lexical",
    "Syntax",
    "Code execution",
    "Core processing",
    "Total execution",
];

pub const OUTPUT_TRUNCATION_MARKER: &str = "\n... (Output truncated due to length)";
pub const ERROR_TRUNCATION_MARKER: &str = "... (Error message truncated)";

static CORE_PROCESSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Core processing: ([\d.]+)ms").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Normal,
    Suppressing,
}

/// Line classifier for interpreter stdout.
///
/// A marker line switches to `Suppressing`; indented lines after it belong
/// to the diagnostic block and are dropped too. The first unindented,
/// non-marker line is program output again and switches back to `Normal`.
/// Blank lines are always dropped.
#[derive(Debug)]
pub struct DiagnosticFilter {
    state: FilterState,
}

impl Default for DiagnosticFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Normal,
        }
    }

    /// Feed one line; true if it belongs in the cleaned output
    pub fn keep(&mut self, line: &str) -> bool {
        if is_marker(line) {
            self.state = FilterState::Suppressing;
            return false;
        }
        if line.trim().is_empty() {
            return false;
        }
        if self.state == FilterState::Suppressing && line.starts_with(char::is_whitespace) {
            return false;
        }
        self.state = FilterState::Normal;
        true
    }

    pub fn is_suppressing(&self) -> bool {
        self.state == FilterState::Suppressing
    }
}

fn is_marker(line: &str) -> bool {
    let line = line.trim_start();
    DIAGNOSTIC_MARKERS.iter().any(|m| line.starts_with(m))
}

/// Drop diagnostic and blank lines and rejoin the rest
pub fn strip_diagnostics(stdout: &str) -> String {
    let mut filter = DiagnosticFilter::new();
    stdout
        .lines()
        .filter(|line| filter.keep(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// The interpreter's own timing figure, if it printed one
pub fn core_processing_ms(stdout: &str) -> Option<f64> {
    CORE_PROCESSING
        .captures(stdout)
        .and_then(|caps| caps[1].parse().ok())
}

/// Cut `text` to `max` characters, appending `marker` if anything was cut
pub fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}

/// Human-readable timing line appended to successful output
pub fn performance_note(execution_time_ms: f64) -> String {
    let tier = if execution_time_ms < 1.0 {
        " (sub-millisecond)"
    } else if execution_time_ms < 5.0 {
        " (under 5ms)"
    } else {
        " (native speed)"
    };
    format!("\n\n⚡ Processing: {:.7}ms{}", execution_time_ms, tier)
}

/// Build the caller-facing result for one interpreter run
pub fn process_outcome(outcome: &ProcessOutcome, config: &RunnerConfig) -> ExecutionResult {
    let elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0;

    match &outcome.termination {
        Termination::TimedOut => ExecutionResult::failed(
            format!(
                "Processing took too long ({} seconds). Please try reducing code complexity.",
                config.timeout.as_secs_f64()
            ),
            Some(config.timeout.as_millis() as f64),
        ),
        Termination::LaunchFailed(reason) => ExecutionResult::failed(
            format!("Failed to start interpreter: {}", reason),
            Some(elapsed_ms),
        ),
        Termination::Exited(0) => {
            let execution_time_ms = core_processing_ms(&outcome.stdout).unwrap_or(elapsed_ms);

            let cleaned = strip_diagnostics(&outcome.stdout);
            let cleaned = if cleaned.is_empty() {
                EMPTY_OUTPUT_MESSAGE.to_string()
            } else {
                cleaned
            };
            let mut output =
                truncate_chars(&cleaned, config.max_output_chars, OUTPUT_TRUNCATION_MARKER);
            if config.annotate_performance {
                output.push_str(&performance_note(execution_time_ms));
            }

            ExecutionResult::succeeded(output, Some(execution_time_ms))
        }
        Termination::Exited(_) | Termination::Signaled => {
            let stderr = outcome.stderr.trim();
            let message = if stderr.is_empty() {
                "Unknown error occurred"
            } else {
                stderr
            };
            ExecutionResult::failed(
                truncate_chars(message, config.max_error_chars, ERROR_TRUNCATION_MARKER),
                Some(elapsed_ms),
            )
        }
    }
}
