//! Centralized error types for Taskwire.

use thiserror::Error;

/// Main error type for Taskwire operations.
#[derive(Error, Debug)]
pub enum TaskwireError {
    #[error("Unauthorized: no active session")]
    Unauthorized,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Broadcast rejected with status {status}: {body}")]
    BroadcastRejected { status: u16, body: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for Taskwire operations.
pub type TaskwireResult<T> = Result<T, TaskwireError>;

impl TaskwireError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
