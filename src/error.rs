//! Error types for Agentr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::Severity;

/// All error types that can occur in Agentr
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool failed while executing an action
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// The model reply did not contain a usable action
    #[error("Parse error: {0}")]
    Parse(String),

    /// An LLM or tool call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The loop detector stopped the run
    #[error("Loop detected ({severity}): {description}")]
    LoopDetected {
        severity: Severity,
        description: String,
    },

    /// Planning failed; the caller falls back to unplanned execution
    #[error("Planning error: {0}")]
    Planning(String),

    /// A compressed message did not round-trip back to its original text
    #[error("Compression invariant violation: {0}")]
    CompressionInvariant(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Run was cancelled by the host
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Agentr operations
pub type Result<T> = std::result::Result<T, AgentError>;
