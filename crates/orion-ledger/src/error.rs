//! Error types for the ledger.

use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient write contention or timeout reported by the store
    #[error("Storage busy: {0}")]
    Busy(String),

    /// A stored record or index key could not be interpreted
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Placement or distribution rejected the operation
    #[error(transparent)]
    Engine(#[from] orion_matrix::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Engine(e) => e.is_retryable(),
            Error::Busy(_) => true,
            _ => false,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        if crate::txn::is_conflict(&e) {
            Error::Busy(e.to_string())
        } else {
            Error::Storage(e.to_string())
        }
    }
}
