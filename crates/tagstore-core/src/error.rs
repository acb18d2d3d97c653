//! Error types for tagstore-core.

use thiserror::Error;

/// Result type for tagstore-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or checking statements.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A predicate, operation or key could not be decoded.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A signature did not verify against the creator's public key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}
