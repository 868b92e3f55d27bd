//! Error types for the copperkite domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! `PhaseCeilingExceeded` is deliberately NOT an error: hitting the phase
//! ceiling forces termination with a partial answer and is reported as a
//! stop reason on the round outcome. Likewise a dependency stalled by a
//! failed upstream call is a state (`Pending` forever), not an error value.

use thiserror::Error;

/// The top-level error type for all copperkite operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Pipeline errors ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // --- Executor errors ---
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    // --- Model provider errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Summarization errors ---
    #[error("Summarization error: {0}")]
    Summarize(#[from] SummarizeError),

    // --- Session store errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Programming errors in pipeline state handling. These indicate a caller
/// bug, not a runtime condition, and are never absorbed into a record.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Invalid transition for call {call_id}: {from} -> {attempted}")]
    InvalidTransition {
        call_id: String,
        from: String,
        attempted: String,
    },

    #[error("Unknown call id: {0}")]
    UnknownCall(String),

    #[error("Duplicate call id: {0}")]
    DuplicateCall(String),
}

/// A tool invocation raised an error. Recovered locally into the record's
/// error state and surfaced to the model as a tool-result-with-error turn.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors at the model provider boundary.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

/// The summarization call failed. The compactor recovers by falling back
/// to plain message-count truncation.
#[derive(Debug, Clone, Error)]
pub enum SummarizeError {
    #[error("Summarization failed: {0}")]
    Failed(String),
}

/// Errors from the injected session store.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt session payload for {key}: {reason}")]
    CorruptPayload { key: String, reason: String },
}
