//! The response payload

use serde::{Deserialize, Serialize};

/// Shown when a run succeeds but prints nothing
pub const EMPTY_OUTPUT_MESSAGE: &str = "Code executed successfully!";

/// Inbound body of `POST /api/run-luma`
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
}

/// What the caller gets back for every submission.
///
/// Exactly one of `output` / `error` is set, matching `success`. The
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "execution_time", skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>, execution_time_ms: Option<f64>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, execution_time_ms: Option<f64>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }

    /// Canned answer for a submission with nothing to run
    pub fn empty_submission() -> Self {
        Self::succeeded(EMPTY_OUTPUT_MESSAGE, None)
    }

    /// Last-resort answer when something unexpected broke
    pub fn server_error(description: impl std::fmt::Display) -> Self {
        Self::failed(format!("Server error: {}", description), None)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"Server error: {}"}}"#, e)
        })
    }
}
