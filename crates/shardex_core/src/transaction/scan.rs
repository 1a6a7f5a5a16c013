//! Ordered scans and the reconciliation of superseded revisions.
//!
//! Re-saving an entity under an ordered index at a new position leaves its
//! old revision behind, because the position is part of the key. A scan
//! reports only the first revision of every entity it meets and, when the
//! index has `auto_remove`, remembers the key ranges of the later ones.
//! Revisions left behind by a delete are treated the same way: a pointer
//! that no longer resolves, or an inline body whose entity is gone from the
//! value index.
//! Those ranges are deleted once the caller is done reading: on
//! [`EntityScan::finish`] or when the scan is dropped. The store iterator is
//! closed before anything is written.

use crate::codec::BodyCodec;
use crate::entity::{Entity, EntityId};
use crate::error::CoreResult;
use crate::key::{self, FieldTag};
use crate::schema::EntityIndex;
use crate::types::{POSITION_LEN, SCOPE_LEN};
use serde::de::DeserializeOwned;
use shardex_storage::{KvIter, KvPair, KvStore, WriteBatch};
use std::collections::HashSet;
use std::marker::PhantomData;

/// Range deletes written per batch during reconciliation.
const RECONCILE_CHUNK: usize = 512;

/// The records of one entity revision, merged.
#[derive(Debug)]
struct Revision {
    prefix: Vec<u8>,
    id: Option<EntityId>,
    body: Option<Vec<u8>>,
    pointer: Option<Vec<u8>>,
    position: Option<i64>,
}

impl Revision {
    fn new(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            id: None,
            body: None,
            pointer: None,
            position: None,
        }
    }

    fn absorb(&mut self, tag: u8, value: Vec<u8>) {
        match FieldTag::from_byte(tag) {
            Some(FieldTag::EntityId) => self.id = EntityId::from_slice(&value),
            Some(FieldTag::Body) => self.body = Some(value),
            Some(FieldTag::Pointer) => self.pointer = Some(value),
            Some(FieldTag::Position) => {
                self.position = value
                    .get(..POSITION_LEN)
                    .and_then(|bytes| bytes.try_into().ok())
                    .map(i64::from_be_bytes);
            }
            None => tracing::trace!(tag, "ignoring record with unknown field tag"),
        }
    }

    fn holds(&self, key: &[u8]) -> bool {
        key.len() == self.prefix.len() + 1 && key.starts_with(&self.prefix)
    }
}

/// Lazy, forward-only sequence of the entities of one scope in one index.
///
/// Yields each entity once, in index order. Records past the scan's record
/// cap are not visited.
pub struct EntityScan<'a, T, C> {
    records: Option<KvIter<'a>>,
    store: &'a dyn KvStore,
    index: &'a EntityIndex,
    value_index: &'a EntityIndex,
    codec: &'a C,
    lookahead: Option<KvPair>,
    seen: HashSet<EntityId>,
    superseded: Vec<(Vec<u8>, Vec<u8>)>,
    visited: usize,
    cap: usize,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T, C> EntityScan<'a, T, C> {
    pub(crate) fn new(
        records: KvIter<'a>,
        store: &'a dyn KvStore,
        index: &'a EntityIndex,
        value_index: &'a EntityIndex,
        codec: &'a C,
        cap: usize,
    ) -> Self {
        Self {
            records: Some(records),
            store,
            index,
            value_index,
            codec,
            lookahead: None,
            seen: HashSet::new(),
            superseded: Vec::new(),
            visited: 0,
            cap,
            _entity: PhantomData,
        }
    }

    /// The index being scanned.
    #[must_use]
    pub fn index(&self) -> &EntityIndex {
        self.index
    }

    /// Store records read so far.
    #[must_use]
    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Stale revisions found so far and not yet deleted.
    #[must_use]
    pub fn superseded(&self) -> usize {
        self.superseded.len()
    }

    /// Stops reading and deletes the stale revisions found so far.
    ///
    /// Returns how many revisions were deleted.
    ///
    /// # Errors
    ///
    /// Returns the store error if a delete batch fails. Batches written
    /// before the failure stay written.
    pub fn finish(mut self) -> CoreResult<usize> {
        self.reconcile()
    }

    fn reconcile(&mut self) -> CoreResult<usize> {
        self.records = None;
        self.lookahead = None;
        let ranges = std::mem::take(&mut self.superseded);
        for chunk in ranges.chunks(RECONCILE_CHUNK) {
            let mut batch = WriteBatch::new();
            for (from, to) in chunk {
                batch.delete_range(self.index.column(), from.clone(), to.clone());
            }
            self.store.write(&batch)?;
        }
        if !ranges.is_empty() {
            tracing::debug!(
                column = self.index.column(),
                removed = ranges.len(),
                "removed superseded revisions"
            );
        }
        Ok(ranges.len())
    }

    fn pull(&mut self) -> CoreResult<Option<KvPair>> {
        let Some(records) = self.records.as_mut() else {
            return Ok(None);
        };
        if self.visited >= self.cap {
            tracing::warn!(
                column = self.index.column(),
                cap = self.cap,
                "scan stopped at its record cap"
            );
            self.records = None;
            return Ok(None);
        }
        match records.next() {
            Some(Ok(record)) => {
                self.visited += 1;
                Ok(Some(record))
            }
            Some(Err(err)) => {
                self.records = None;
                Err(err.into())
            }
            None => {
                self.records = None;
                Ok(None)
            }
        }
    }

    fn next_revision(&mut self) -> CoreResult<Option<Revision>> {
        let first = match self.lookahead.take() {
            Some(record) => record,
            None => match self.pull()? {
                Some(record) => record,
                None => return Ok(None),
            },
        };
        let (first_key, first_value) = first;
        let Some((prefix, tag)) = key::split_tag(&first_key) else {
            return Ok(None);
        };
        let mut revision = Revision::new(prefix.to_vec());
        revision.absorb(tag, first_value);

        while let Some((key, value)) = self.pull()? {
            if revision.holds(&key) {
                revision.absorb(key[key.len() - 1], value);
            } else {
                self.lookahead = Some((key, value));
                break;
            }
        }
        Ok(Some(revision))
    }
}

impl<T, C> EntityScan<'_, T, C>
where
    T: Entity + DeserializeOwned,
    C: BodyCodec,
{
    fn resolve(&mut self, revision: Revision) -> CoreResult<Option<T>> {
        let Some(id) = revision.id else {
            tracing::trace!(column = self.index.column(), "skipping revision without an id");
            return Ok(None);
        };
        if !self.seen.insert(id) {
            self.discard(&revision.prefix);
            return Ok(None);
        }

        let inline = revision.body.is_some();
        let body = match (revision.body, revision.pointer) {
            (Some(body), _) => body,
            (None, Some(pointer)) => {
                let value_key = key::with_tag(&pointer, FieldTag::Body);
                match self.store.get(self.value_index.column(), &value_key)? {
                    Some(body) => body,
                    None => {
                        tracing::trace!(%id, column = self.index.column(), "skipping dangling pointer");
                        self.discard(&revision.prefix);
                        return Ok(None);
                    }
                }
            }
            (None, None) => return Ok(None),
        };

        let mut entity: T = self.codec.decode(&body)?;
        let order = self.index.order();
        let position = if order.is_ordered() {
            key::position_segment(&revision.prefix, order)
        } else {
            revision.position
        };
        if let Some(position) = position {
            entity.set_position(position);
        }

        if inline
            && order.is_ordered()
            && !self.is_value_index()
            && !self.value_holds(&revision.prefix, &entity)?
        {
            tracing::trace!(%id, column = self.index.column(), "skipping revision of a deleted entity");
            self.discard(&revision.prefix);
            return Ok(None);
        }
        Ok(Some(entity))
    }

    fn is_value_index(&self) -> bool {
        std::ptr::eq(self.index, self.value_index)
    }

    /// Whether the value index still stores the entity an inline revision
    /// was written for.
    fn value_holds(&self, prefix: &[u8], entity: &T) -> CoreResult<bool> {
        let Some(segment) = prefix.get(..SCOPE_LEN) else {
            return Ok(false);
        };
        let value_prefix = self.value_index.make_key(segment, entity, entity.position())?;
        let id_key = key::with_tag(&value_prefix, FieldTag::EntityId);
        Ok(self.store.get(self.value_index.column(), &id_key)?.is_some())
    }
}

impl<T, C> EntityScan<'_, T, C> {
    /// Queues the records under `prefix` for removal when the index has
    /// `auto_remove`.
    fn discard(&mut self, prefix: &[u8]) {
        if self.index.auto_remove() {
            self.superseded.push(key::tag_range(prefix));
        }
    }
}

impl<T, C> Iterator for EntityScan<'_, T, C>
where
    T: Entity + DeserializeOwned,
    C: BodyCodec,
{
    type Item = CoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let revision = match self.next_revision() {
                Ok(Some(revision)) => revision,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            };
            match self.resolve(revision) {
                Ok(Some(entity)) => return Some(Ok(entity)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<T, C> Drop for EntityScan<'_, T, C> {
    fn drop(&mut self) {
        if let Err(err) = self.reconcile() {
            tracing::warn!(
                column = self.index.column(),
                error = %err,
                "failed to remove superseded revisions"
            );
        }
    }
}

impl<T, C> std::fmt::Debug for EntityScan<'_, T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityScan")
            .field("column", &self.index.column())
            .field("visited", &self.visited)
            .field("superseded", &self.superseded.len())
            .finish_non_exhaustive()
    }
}
