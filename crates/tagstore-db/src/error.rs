//! Error types for the tag database.

use thiserror::Error;

/// Result type for tag database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tag database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input (unknown predicate, empty peer key, bad config value)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transactional store failed to read or commit
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row or index entry is missing or unreadable
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model error
    #[error(transparent)]
    Core(#[from] tagstore_core::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
