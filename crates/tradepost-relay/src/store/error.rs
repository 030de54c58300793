//! Store error types.

/// Errors from message store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Underlying database or I/O failure.
    #[error("store I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}
