//! Transaction state.

use crate::error::{CoreError, CoreResult};

/// State of a transaction.
///
/// `Open` is the only state that accepts writes. Reads are allowed in every
/// state and see what the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Buffering writes.
    Open,
    /// The batch was written. Terminal.
    Committed,
    /// The batch could not be written. Terminal.
    Failed,
}

impl TransactionState {
    /// Returns `true` while writes are accepted.
    #[must_use]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Fails with a usage error unless the state is `Open`.
    pub(crate) fn ensure_open(self, operation: &str) -> CoreResult<()> {
        match self {
            Self::Open => Ok(()),
            Self::Committed => Err(CoreError::usage(format!(
                "cannot {operation}: transaction already committed"
            ))),
            Self::Failed => Err(CoreError::usage(format!(
                "cannot {operation}: transaction failed to commit"
            ))),
        }
    }
}
