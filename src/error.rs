//! Agent error taxonomy with recovery classification.
//!
//! Distinguishes errors the pipeline can defer (connectivity), errors the
//! executor can absorb through tool fallback, and errors that are fatal to
//! the whole goal.

use serde::{Deserialize, Serialize};

/// Error raised by the goal pipeline, the plan executor, and their
/// collaborators. Every variant carries the original message verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// Network or timeout condition. Queueable at a stage boundary,
    /// converted into a step failure inside the executor.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Credential or authorization class failure. Aborts plan execution
    /// immediately and fails the goal; never queued.
    #[error("critical error: {0}")]
    Critical(String),

    /// Tool-body failure or unknown tool. Recoverable through the
    /// alternatives fallback, then terminal for the step.
    #[error("tool error: {0}")]
    Tool(String),

    /// Malformed plan (forward dependency, duplicate step number) or bad
    /// registration. Fatal to the whole goal, surfaced immediately.
    #[error("validation error: {0}")]
    Validation(String),

    /// High-risk tool invoked without permission. Recoverable through
    /// fallback like a tool error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Non-connectivity inference failure (bad status, malformed payload).
    /// Fatal at a stage boundary.
    #[error("inference error: {0}")]
    Inference(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Connectivity(_) => ErrorKind::Connectivity,
            AgentError::Critical(_) => ErrorKind::Critical,
            AgentError::Tool(_) => ErrorKind::Tool,
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::Permission(_) => ErrorKind::Permission,
            AgentError::Inference(_) => ErrorKind::Inference,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            AgentError::Connectivity(m)
            | AgentError::Critical(m)
            | AgentError::Tool(m)
            | AgentError::Validation(m)
            | AgentError::Permission(m)
            | AgentError::Inference(m) => m,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    pub fn is_critical(&self) -> bool {
        self.kind() == ErrorKind::Critical
    }

    /// Whether the executor may continue the step through the alternatives
    /// fallback after this failure.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

/// Kind enumerant for failure records (step results, execution history,
/// queue entries) where only the classification survives the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Critical,
    Tool,
    Validation,
    Permission,
    Inference,
}

impl ErrorKind {
    /// Connectivity and tool-class failures enter the fallback path; the
    /// rest stop the enclosing loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Connectivity | ErrorKind::Tool | ErrorKind::Permission
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Critical => write!(f, "critical"),
            ErrorKind::Tool => write!(f, "tool"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Permission => write!(f, "permission"),
            ErrorKind::Inference => write!(f, "inference"),
        }
    }
}

/// Classify an error that crossed a tool-body boundary as `anyhow::Error`.
///
/// A typed [`AgentError`] keeps its kind (a tool body may signal a critical
/// or connectivity condition); anything else is a plain tool failure.
pub fn classify_tool_failure(err: &anyhow::Error) -> ErrorKind {
    match err.downcast_ref::<AgentError>() {
        Some(agent_err) => agent_err.kind(),
        None => ErrorKind::Tool,
    }
}
