//! Submission screening
//!
//! Cheap textual checks that run before anything touches the disk or
//! spawns a process. The loop check is a heuristic: it counts lines that
//! mention both `while` and `true`. It catches the obvious runaway
//! submissions and nothing more; the timeout is the real backstop.

use crate::config::RunnerConfig;

/// Outcome of screening one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict<'a> {
    /// Nothing to run; answer with the canned success message
    Empty,
    /// Run this (trimmed) source
    Accepted(&'a str),
    Rejected(GuardRejection),
}

/// Reasons a submission is refused before execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardRejection {
    /// `length` is a lower bound when the request body itself was cut off
    #[error("Code too long (maximum {} characters)", group_thousands(.max))]
    TooLong { length: usize, max: usize },
    #[error("Too many while loops detected that may cause infinite loops. Please check loop termination conditions.")]
    UnboundedLoops { found: usize, max: usize },
}

/// Screen a submission. Rules apply in order and the first match wins.
pub fn screen<'a>(code: &'a str, config: &RunnerConfig) -> GuardVerdict<'a> {
    let code = code.trim();
    if code.is_empty() {
        return GuardVerdict::Empty;
    }

    let length = code.chars().count();
    if length > config.max_code_chars {
        return GuardVerdict::Rejected(GuardRejection::TooLong {
            length,
            max: config.max_code_chars,
        });
    }

    // Only the loop heuristic is optional; the length ceiling always holds
    if !config.screening {
        return GuardVerdict::Accepted(code);
    }

    let found = count_unbounded_loops(code);
    if found > config.max_unbounded_loops {
        return GuardVerdict::Rejected(GuardRejection::UnboundedLoops {
            found,
            max: config.max_unbounded_loops,
        });
    }

    GuardVerdict::Accepted(code)
}

/// Lines containing both "while" and "true", case-insensitive
pub fn count_unbounded_loops(code: &str) -> usize {
    code.lines()
        .map(str::to_lowercase)
        .filter(|line| line.contains("while") && line.contains("true"))
        .count()
}

fn group_thousands(n: &usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
