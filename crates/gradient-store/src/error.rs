//! Error types for the Gradient release store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// `ReleaseNotFound` is a sentinel: callers that tolerate absence
/// (admission, reconciliation) match on it and treat it as "nothing to
/// do"; any other variant is an internal storage fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("release not found: {0}")]
    ReleaseNotFound(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// True when the error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ReleaseNotFound(_))
    }
}
