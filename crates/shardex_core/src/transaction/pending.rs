//! Buffered writes and the cache effects that follow them.

use crate::error::CoreResult;
use crate::schema::{IndexHandle, Schema};
use crate::shard::Instance;
use parking_lot::Mutex;
use shardex_storage::WriteBatch;
use std::sync::Arc;

/// Cache change applied once the batch it belongs to is stored.
#[derive(Debug)]
pub(crate) enum CacheEffect {
    Insert {
        index: IndexHandle,
        key: Vec<u8>,
        body: Vec<u8>,
    },
    Evict {
        index: IndexHandle,
        key: Vec<u8>,
    },
    EvictPrefix {
        index: IndexHandle,
        prefix: Vec<u8>,
    },
}

impl CacheEffect {
    fn apply(self, schema: &Schema) {
        let handle = match &self {
            Self::Insert { index, .. } | Self::Evict { index, .. } | Self::EvictPrefix { index, .. } => *index,
        };
        let Some(cache) = schema.index(handle).ok().and_then(|index| index.cache()) else {
            return;
        };
        match self {
            Self::Insert { key, body, .. } => cache.insert(key, body),
            Self::Evict { key, .. } => cache.remove(&key),
            Self::EvictPrefix { prefix, .. } => cache.remove_prefix(&prefix),
        }
    }
}

/// Writes of one shard waiting for commit.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    pub(crate) batch: WriteBatch,
    pub(crate) effects: Vec<CacheEffect>,
}

/// A pending batch shared by every scope of one shard.
pub(crate) type SharedBatch = Arc<Mutex<PendingBatch>>;

/// Writes a pending batch, then applies its cache effects.
///
/// On failure the batch stays buffered and no effect is applied.
pub(crate) fn flush(schema: &Schema, instance: &Instance, pending: &Mutex<PendingBatch>) -> CoreResult<usize> {
    let mut pending = pending.lock();
    if !pending.batch.is_empty() {
        instance.store().write(&pending.batch)?;
    }
    let PendingBatch { batch, effects } = std::mem::take(&mut *pending);
    drop(pending);

    for effect in effects {
        effect.apply(schema);
    }
    tracing::debug!(shard = instance.shard(), writes = batch.len(), "batch committed");
    Ok(batch.len())
}
