//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named column was not opened on this store.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// A range delete was given an end bound before its start bound.
    #[error("invalid range in column {column}: start is after end")]
    InvalidRange {
        /// The column the range was addressed to.
        column: String,
    },

    /// The storage engine reported a failure.
    #[error("storage engine error: {0}")]
    Engine(String),

    /// The store is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        let message = err.into_string();
        if message.starts_with("Corruption") {
            Self::Corrupted(message)
        } else {
            Self::Engine(message)
        }
    }
}
