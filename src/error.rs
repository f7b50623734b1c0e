//! Error types for the Iaso self-healing pipeline
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation at the
//! binary edge.
//!
//! Run-level versus candidate-level containment is a pipeline concern, not
//! an error-type concern: the same `Database` error aborts the run when it
//! comes from candidate selection but only fails one candidate when it
//! comes from the completion marker.

use thiserror::Error;

/// Main error type for Iaso operations
#[derive(Error, Debug)]
pub enum IasoError {
    /// Ledger or index database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Oracle API request failed
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Judge oracle returned something other than yes/no
    #[error("Judge protocol violation: {0}")]
    ProtocolViolation(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Invalid interaction ID format
    #[error("Invalid interaction ID: {0}")]
    InvalidInteractionId(#[from] uuid::Error),

    /// Interaction not found in the ledger
    #[error("Interaction not found: {0}")]
    InteractionNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// External call exceeded its configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid operation (e.g., rating outside the allowed range)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Iaso operations
pub type Result<T> = std::result::Result<T, IasoError>;

/// Convert anyhow::Error to IasoError
impl From<anyhow::Error> for IasoError {
    fn from(err: anyhow::Error) -> Self {
        IasoError::Other(err.to_string())
    }
}
