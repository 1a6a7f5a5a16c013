//! Single-scope transactions.

use super::pending::{flush, CacheEffect, SharedBatch};
use super::scan::EntityScan;
use super::state::TransactionState;
use crate::codec::{BodyCodec, JsonCodec};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::key::{self, FieldTag};
use crate::lock::ReleaseHandle;
use crate::schema::{EntityIndex, EntityKind, IndexHandle, Kind, Schema};
use crate::shard::Instance;
use crate::types::{positions, Order, ScopeKey, SCOPE_LEN};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A unit of work on one scope.
///
/// Writes are buffered and written atomically by [`Transaction::commit`].
/// Reads go straight to the store and do not see buffered writes.
/// Dropping a transaction discards its buffered writes and releases its
/// scope lock, if it holds one.
pub struct Transaction<C: BodyCodec = JsonCodec> {
    schema: Arc<Schema>,
    instance: Arc<Instance>,
    scope: ScopeKey,
    segment: [u8; SCOPE_LEN],
    position: i64,
    pending: SharedBatch,
    state: TransactionState,
    member: bool,
    codec: C,
    scan_cap: usize,
    release: Option<ReleaseHandle>,
}

impl<C: BodyCodec> Transaction<C> {
    pub(crate) fn new(
        schema: Arc<Schema>,
        instance: Arc<Instance>,
        scope: ScopeKey,
        pending: SharedBatch,
        codec: C,
        scan_cap: usize,
    ) -> Self {
        Self {
            schema,
            instance,
            segment: scope.segment(),
            scope,
            position: positions::now(),
            pending,
            state: TransactionState::Open,
            member: false,
            codec,
            scan_cap,
            release: None,
        }
    }

    pub(crate) fn with_release(mut self, release: ReleaseHandle) -> Self {
        self.release = Some(release);
        self
    }

    pub(crate) fn into_member(mut self) -> Self {
        self.member = true;
        self
    }

    pub(crate) fn mark(&mut self, state: TransactionState) {
        self.state = state;
    }

    /// The scope this transaction works on.
    #[must_use]
    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Shard the scope routes to.
    #[must_use]
    pub fn shard(&self) -> usize {
        self.instance.shard()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether this transaction holds a scope lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.release.is_some()
    }

    /// Buffered writes not yet committed, across every scope sharing this
    /// transaction's batch.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.lock().batch.len()
    }

    /// Current logical position. Seeded from the wall clock.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Advances the logical position and returns it.
    pub fn next_position(&mut self) -> i64 {
        self.position += 1;
        self.position
    }

    /// Replaces the logical position.
    pub fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    /// Gives `entity` the next logical position and returns it.
    pub fn set_next_position<T: Entity>(&mut self, entity: &mut T) -> i64 {
        let position = self.next_position();
        entity.set_position(position);
        position
    }

    fn ensure_writable(&self, operation: &str) -> CoreResult<()> {
        self.state.ensure_open(operation)
    }

    /// Buffers `entity` into every index that accepts it, encoding the body
    /// with the transaction's codec.
    ///
    /// An entity whose position is unset (`<= 0`) first receives the
    /// transaction's current position. Returns the encoded body.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the transaction is not open or an ordered
    /// index needs a position the entity lacks, and a configuration error if
    /// the kind has no value index. Nothing is buffered on error.
    pub fn save_entity<T>(&mut self, kind: &Kind<T>, entity: &mut T) -> CoreResult<Vec<u8>>
    where
        T: Entity + Serialize,
    {
        let codec = self.codec.clone();
        self.save_entity_with(kind, entity, |entity| codec.encode(entity))
    }

    /// Like [`Transaction::save_entity`], with the body produced by `encode`.
    ///
    /// # Errors
    ///
    /// See [`Transaction::save_entity`]; errors from `encode` are returned
    /// unchanged.
    pub fn save_entity_with<T, F>(
        &mut self,
        kind: &Kind<T>,
        entity: &mut T,
        encode: F,
    ) -> CoreResult<Vec<u8>>
    where
        T: Entity,
        F: FnOnce(&T) -> CoreResult<Vec<u8>>,
    {
        self.ensure_writable("save")?;
        let entity_kind = self.schema.resolve(kind)?;
        let value_index = entity_kind.value_index()?;

        if matches!(entity.position(), Some(position) if position <= 0) {
            entity.set_position(self.position);
        }
        let position = entity.position();
        let body = encode(entity)?;

        let erased: &dyn Any = &*entity;
        let value_key = value_index.make_key(&self.segment, erased, position)?;
        let targets = self.keys_for(entity_kind, erased, position, |_| true)?;
        let value_slot = entity_kind.value_slot();
        let id = entity.entity_id();

        let mut pending = self.pending.lock();
        for (slot, index, prefix) in targets {
            let column = index.column();
            pending.batch.put(
                column,
                key::with_tag(&prefix, FieldTag::EntityId),
                id.as_bytes().to_vec(),
            );
            if index.has_value() {
                pending
                    .batch
                    .put(column, key::with_tag(&prefix, FieldTag::Body), body.clone());
            } else {
                pending
                    .batch
                    .put(column, key::with_tag(&prefix, FieldTag::Pointer), value_key.clone());
            }
            if Some(slot) == value_slot {
                if let Some(position) = position {
                    pending.batch.put(
                        column,
                        key::with_tag(&prefix, FieldTag::Position),
                        position.to_be_bytes().to_vec(),
                    );
                }
            }
            if let Some(cache) = index.cache() {
                cache.remove(&prefix);
                pending.effects.push(CacheEffect::Insert {
                    index: IndexHandle {
                        kind: kind.id(),
                        slot,
                    },
                    key: prefix,
                    body: body.clone(),
                });
            }
        }
        tracing::trace!(scope = %self.scope, kind = entity_kind.name(), %id, "entity buffered");
        Ok(body)
    }

    /// Key prefixes of `entity` in every accepting index passing `filter`.
    fn keys_for<'s>(
        &self,
        entity_kind: &'s EntityKind,
        entity: &dyn Any,
        position: Option<i64>,
        filter: impl Fn(&EntityIndex) -> bool,
    ) -> CoreResult<Vec<(usize, &'s EntityIndex, Vec<u8>)>> {
        let mut targets = Vec::new();
        for (slot, index) in entity_kind.indexes().iter().enumerate() {
            if index.accepts(entity) && filter(index) {
                let prefix = index.make_key(&self.segment, entity, position)?;
                targets.push((slot, index, prefix));
            }
        }
        Ok(targets)
    }

    /// First index of `order` that accepts `probe`.
    fn lookup_index<'s>(
        entity_kind: &'s EntityKind,
        probe: &dyn Any,
        order: Order,
    ) -> CoreResult<Option<&'s EntityIndex>> {
        let mut candidates = entity_kind
            .indexes()
            .iter()
            .filter(|index| index.order() == order)
            .peekable();
        if candidates.peek().is_none() {
            return Err(CoreError::configuration(format!(
                "kind {} has no {order} index",
                entity_kind.name()
            )));
        }
        Ok(candidates.find(|index| index.accepts(probe)))
    }

    /// Returns `true` if the entity identified by `probe` is stored in the
    /// first index of `order` that accepts it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the kind has no index of `order`,
    /// and propagates store failures.
    pub fn contains_entity<T: Entity>(&self, kind: &Kind<T>, probe: &T, order: Order) -> CoreResult<bool> {
        let entity_kind = self.schema.resolve(kind)?;
        let Some(index) = Self::lookup_index(entity_kind, probe, order)? else {
            return Ok(false);
        };
        let prefix = index.make_key(&self.segment, probe, probe.position())?;
        if index.cache().is_some_and(|cache| cache.contains(&prefix)) {
            return Ok(true);
        }
        let id_key = key::with_tag(&prefix, FieldTag::EntityId);
        Ok(self.instance.store().get(index.column(), &id_key)?.is_some())
    }

    /// Loads the entity identified by `probe` from the first index of
    /// `order` that accepts it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the kind has no index of `order`, a
    /// codec error if the stored body does not decode, and propagates store
    /// failures.
    pub fn try_get_entity<T>(&self, kind: &Kind<T>, probe: &T, order: Order) -> CoreResult<Option<T>>
    where
        T: Entity + DeserializeOwned,
    {
        let entity_kind = self.schema.resolve(kind)?;
        let Some(index) = Self::lookup_index(entity_kind, probe, order)? else {
            return Ok(None);
        };
        let prefix = index.make_key(&self.segment, probe, probe.position())?;

        let cached = index.cache().and_then(|cache| cache.get(&prefix));
        let body = match cached {
            Some(body) => body,
            None => match self.read_body(entity_kind, index, &prefix)? {
                Some(body) => {
                    if let Some(cache) = index.cache() {
                        cache.insert(prefix.clone(), body.clone());
                    }
                    body
                }
                None => return Ok(None),
            },
        };
        self.codec.decode(&body).map(Some)
    }

    fn read_body(
        &self,
        entity_kind: &EntityKind,
        index: &EntityIndex,
        prefix: &[u8],
    ) -> CoreResult<Option<Vec<u8>>> {
        let store = self.instance.store();
        if index.has_value() {
            return Ok(store.get(index.column(), &key::with_tag(prefix, FieldTag::Body))?);
        }
        let Some(pointer) = store.get(index.column(), &key::with_tag(prefix, FieldTag::Pointer))? else {
            return Ok(None);
        };
        let value_index = entity_kind.value_index()?;
        Ok(store.get(value_index.column(), &key::with_tag(&pointer, FieldTag::Body))?)
    }

    /// Scans the unpartitioned index of `order`.
    ///
    /// `position` is an exclusive cursor: 0 starts at the beginning, any
    /// other value starts right after it in scan direction.
    ///
    /// # Errors
    ///
    /// Returns a usage error for a non-zero cursor on an unordered scan and
    /// a configuration error if the kind has no matching index.
    pub fn get_entities<T>(&self, kind: &Kind<T>, position: i64, order: Order) -> CoreResult<EntityScan<'_, T, C>>
    where
        T: Entity + DeserializeOwned,
    {
        self.scan(kind, position, order, None)
    }

    /// Scans the index of `order` whose name starts with `index_prefix`,
    /// e.g. `Status-Live` for one partition of a partitioned index.
    ///
    /// # Errors
    ///
    /// See [`Transaction::get_entities`].
    pub fn get_entities_in<T>(
        &self,
        kind: &Kind<T>,
        position: i64,
        order: Order,
        index_prefix: &str,
    ) -> CoreResult<EntityScan<'_, T, C>>
    where
        T: Entity + DeserializeOwned,
    {
        self.scan(kind, position, order, Some(index_prefix))
    }

    fn scan<T>(
        &self,
        kind: &Kind<T>,
        position: i64,
        order: Order,
        index_prefix: Option<&str>,
    ) -> CoreResult<EntityScan<'_, T, C>>
    where
        T: Entity + DeserializeOwned,
    {
        let entity_kind = self.schema.resolve(kind)?;
        let value_index = entity_kind.value_index()?;
        let start = key::scan_start(&self.segment, order, position)?;

        let index = entity_kind
            .indexes()
            .iter()
            .find(|index| {
                index.order() == order
                    && match index_prefix {
                        Some(prefix) => index.name().starts_with(prefix),
                        None => !index.is_partitioned(),
                    }
            })
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "kind {} has no {order} index{}",
                    entity_kind.name(),
                    index_prefix.map(|p| format!(" named {p}*")).unwrap_or_default()
                ))
            })?;

        let store = self.instance.store();
        let records = store.scan_prefix(index.column(), &self.segment, &start)?;
        Ok(EntityScan::new(
            records,
            store,
            index,
            value_index,
            &self.codec,
            self.scan_cap,
        ))
    }

    /// Removes the entity from every index that accepts it.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the transaction is not open or an ordered
    /// index needs a position the entity lacks.
    pub fn delete_entity<T: Entity>(&mut self, kind: &Kind<T>, entity: &T) -> CoreResult<()> {
        self.delete_matching(kind, entity, |_| true)
    }

    /// Removes the entity from the accepting indexes of `order`, optionally
    /// restricted to indexes whose name starts with `index_prefix`.
    ///
    /// # Errors
    ///
    /// See [`Transaction::delete_entity`].
    pub fn delete_entity_in<T: Entity>(
        &mut self,
        kind: &Kind<T>,
        entity: &T,
        order: Order,
        index_prefix: Option<&str>,
    ) -> CoreResult<()> {
        self.delete_matching(kind, entity, |index| {
            index.order() == order && index_prefix.map_or(true, |p| index.name().starts_with(p))
        })
    }

    fn delete_matching<T: Entity>(
        &mut self,
        kind: &Kind<T>,
        entity: &T,
        filter: impl Fn(&EntityIndex) -> bool,
    ) -> CoreResult<()> {
        self.ensure_writable("delete")?;
        let entity_kind = self.schema.resolve(kind)?;
        let targets = self.keys_for(entity_kind, entity, entity.position(), filter)?;

        let mut pending = self.pending.lock();
        for (slot, index, prefix) in targets {
            for tag in FieldTag::ALL {
                pending.batch.delete(index.column(), key::with_tag(&prefix, tag));
            }
            if let Some(cache) = index.cache() {
                cache.remove(&prefix);
                pending.effects.push(CacheEffect::Evict {
                    index: IndexHandle {
                        kind: kind.id(),
                        slot,
                    },
                    key: prefix,
                });
            }
        }
        Ok(())
    }

    /// Removes every entity of the scope from the unpartitioned indexes of
    /// `order`, starting at `position` (inclusive) in scan direction.
    /// A position of 0 clears the whole scope.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the transaction is not open, or for a
    /// non-zero position on an unordered index.
    pub fn delete_entities<T: Entity>(&mut self, kind: &Kind<T>, position: i64, order: Order) -> CoreResult<()> {
        self.ensure_writable("delete")?;
        let entity_kind = self.schema.resolve(kind)?;
        let from = key::range_start(&self.segment, order, position)?;
        let to = key::scope_end(&self.segment);

        let mut pending = self.pending.lock();
        for (slot, index) in entity_kind.indexes().iter().enumerate() {
            if index.order() != order || index.is_partitioned() {
                continue;
            }
            pending
                .batch
                .delete_range(index.column(), from.clone(), to.clone());
            if let Some(cache) = index.cache() {
                cache.remove_prefix(&self.segment);
                pending.effects.push(CacheEffect::EvictPrefix {
                    index: IndexHandle {
                        kind: kind.id(),
                        slot,
                    },
                    prefix: self.segment.to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Writes the buffered batch atomically.
    ///
    /// # Errors
    ///
    /// Returns a usage error on a second commit, after a failed commit, or
    /// for a scope that belongs to a [`super::TransactionSet`]. Store
    /// failures are returned unchanged and leave the transaction `Failed`.
    pub fn commit(&mut self) -> CoreResult<()> {
        if self.member {
            return Err(CoreError::usage(
                "scope belongs to a transaction set; commit the set",
            ));
        }
        self.state.ensure_open("commit")?;
        match flush(&self.schema, &self.instance, &self.pending) {
            Ok(_) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(scope = %self.scope, error = %err, "commit failed");
                self.state = TransactionState::Failed;
                Err(err)
            }
        }
    }

    /// Ends the transaction, discarding uncommitted writes and releasing
    /// the scope lock. Same as dropping it.
    pub fn dispose(self) {}
}

impl<C: BodyCodec> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.member || !self.state.is_open() {
            return;
        }
        let discarded = self.pending.lock().batch.len();
        if discarded > 0 {
            tracing::debug!(scope = %self.scope, discarded, "dropping uncommitted writes");
        }
    }
}

impl<C: BodyCodec> fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("scope", &self.scope)
            .field("shard", &self.instance.shard())
            .field("state", &self.state)
            .field("position", &self.position)
            .field("locked", &self.release.is_some())
            .finish_non_exhaustive()
    }
}
