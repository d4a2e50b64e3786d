//! Error types shared across the LeadScout workspace.

use thiserror::Error;

/// Result type alias using LeadScout's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the classification and job pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A name failed normalization (empty or whitespace-only).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A `Classification` was constructed with a confidence outside the
    /// range its `Method` allows (spec §3 Confidence invariant).
    #[error("confidence {confidence} out of range [{min}, {max}] for method {method:?}")]
    ConfidenceOutOfRange {
        confidence: f64,
        min: f64,
        max: f64,
        method: crate::method::Method,
    },

    /// The Job Store could not acquire or refresh an exclusive lock.
    #[error("lock conflict for input fingerprint {0}")]
    LockConflict(String),

    /// A durable store (Job Store or Learning Store) failed to persist or
    /// read a record.
    #[error("storage error: {0}")]
    Storage(String),

    /// The LLM Adapter returned a response outside its strict schema.
    #[error("LLM schema violation: {0}")]
    SchemaViolation(String),

    /// The LLM Adapter or Rate Limiter exhausted retries for a name.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Configuration was missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation; treated as fatal.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
