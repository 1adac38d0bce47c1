//! Index error types.

use actready_core::retrieval::RetrievalError;
use thiserror::Error;

/// Errors from chunking, embedding and vector storage.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding endpoint failed or returned an unusable payload.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// `SQLite` error (preserves source chain).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Vector storage operation failed (non-SQLite).
    #[error("Storage failed: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

impl From<IndexError> for RetrievalError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Embedding(msg) => RetrievalError::Embedding(msg),
            other => RetrievalError::Storage(other.to_string()),
        }
    }
}
