//! Error types for shardex core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in shardex core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] shardex_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The schema does not describe what was asked of it.
    ///
    /// Raised for unregistered kinds or indexes, kinds without a value
    /// index and invalid index declarations.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The caller broke a usage rule.
    ///
    /// Raised for ordered writes without a positive position and for writes
    /// or commits on a transaction that is no longer open.
    #[error("usage error: {message}")]
    Usage {
        /// Description of the problem.
        message: String,
    },

    /// No instance is open for the shard a scope resolved to.
    #[error("shard {shard} not found for scope {scope}")]
    ShardNotFound {
        /// The shard number.
        shard: usize,
        /// The scope that was routed.
        scope: String,
    },

    /// A body could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a shard not found error.
    pub fn shard_not_found(shard: usize, scope: impl Into<String>) -> Self {
        Self::ShardNotFound {
            shard,
            scope: scope.into(),
        }
    }

    /// Returns `true` for usage errors.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::codec(err.to_string())
    }
}
