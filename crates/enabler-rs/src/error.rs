//! Error types for enabler-rs

use thiserror::Error;

/// Errors that can occur when driving an external tool
#[derive(Error, Debug)]
pub enum ToolError {
    /// Binary is not on the search path
    #[error("{program} not found in PATH")]
    NotFound { program: String },

    /// Binary ran but exited non-zero
    #[error("`{command}` failed: {stderr}")]
    Failed {
        /// Full command line, program included
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// Output could not be understood
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Captured stderr of a failed invocation
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
