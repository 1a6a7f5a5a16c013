//! Transactions spanning several scopes.

use super::pending::{flush, SharedBatch};
use super::scoped::Transaction;
use super::state::TransactionState;
use crate::codec::{BodyCodec, JsonCodec};
use crate::error::{CoreError, CoreResult};
use crate::lock::ReleaseHandle;
use crate::schema::Schema;
use crate::shard::Instance;
use crate::types::ScopeKey;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One transaction per scope, committed shard by shard.
///
/// Scopes routed to the same shard share one batch, so their writes land
/// together. Writes to different shards are independent: a failure on one
/// shard does not undo the shards already written.
pub struct TransactionSet<C: BodyCodec = JsonCodec> {
    members: Vec<Transaction<C>>,
    batches: BTreeMap<usize, (Arc<Instance>, SharedBatch)>,
    schema: Arc<Schema>,
    state: TransactionState,
    release: Option<ReleaseHandle>,
}

impl<C: BodyCodec> TransactionSet<C> {
    pub(crate) fn new(
        schema: Arc<Schema>,
        members: Vec<Transaction<C>>,
        batches: BTreeMap<usize, (Arc<Instance>, SharedBatch)>,
        release: ReleaseHandle,
    ) -> Self {
        Self {
            members: members.into_iter().map(Transaction::into_member).collect(),
            batches,
            schema,
            state: TransactionState::Open,
            release: Some(release),
        }
    }

    /// The member transaction of `scope`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the scope is not part of the set.
    pub fn scope(&mut self, scope: &ScopeKey) -> CoreResult<&mut Transaction<C>> {
        self.members
            .iter_mut()
            .find(|member| member.scope() == scope)
            .ok_or_else(|| CoreError::usage(format!("scope {scope} is not part of this transaction set")))
    }

    /// The member transaction of `scope`, for reads.
    #[must_use]
    pub fn get(&self, scope: &ScopeKey) -> Option<&Transaction<C>> {
        self.members.iter().find(|member| member.scope() == scope)
    }

    /// Scopes in the set, in request order without duplicates.
    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.members.iter().map(Transaction::scope)
    }

    /// Shards touched by the set, ascending.
    pub fn shards(&self) -> impl Iterator<Item = usize> + '_ {
        self.batches.keys().copied()
    }

    /// Number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` for a set without scopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// State of the set as a whole.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Buffered writes across every shard.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.batches
            .values()
            .map(|(_, pending)| pending.lock().batch.len())
            .sum()
    }

    /// Writes every shard's batch.
    ///
    /// Each shard is written atomically. Every shard is attempted; members
    /// end `Committed` or `Failed` by the outcome of their own shard.
    ///
    /// # Errors
    ///
    /// Returns a usage error unless the set is open, and otherwise the first
    /// shard failure.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.state.ensure_open("commit")?;
        let mut outcomes = BTreeMap::new();
        let mut first_error = None;
        for (shard, (instance, pending)) in &self.batches {
            match flush(&self.schema, instance, pending) {
                Ok(_) => {
                    outcomes.insert(*shard, TransactionState::Committed);
                }
                Err(err) => {
                    tracing::warn!(shard, error = %err, "shard commit failed");
                    outcomes.insert(*shard, TransactionState::Failed);
                    first_error.get_or_insert(err);
                }
            }
        }
        for member in &mut self.members {
            if let Some(state) = outcomes.get(&member.shard()) {
                member.mark(*state);
            }
        }
        match first_error {
            None => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Some(err) => {
                self.state = TransactionState::Failed;
                Err(err)
            }
        }
    }

    /// Ends the set, discarding uncommitted writes and releasing every
    /// scope. Same as dropping it.
    pub fn dispose(self) {}
}

impl<C: BodyCodec> Drop for TransactionSet<C> {
    fn drop(&mut self) {
        if self.state.is_open() {
            let discarded = self.pending_writes();
            if discarded > 0 {
                tracing::debug!(scopes = self.members.len(), discarded, "dropping uncommitted writes");
            }
        }
        // Members go first so the slots outlive every scope's work
        self.members.clear();
        self.release.take();
    }
}

impl<C: BodyCodec> fmt::Debug for TransactionSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSet")
            .field("scopes", &self.members.len())
            .field("shards", &self.batches.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
