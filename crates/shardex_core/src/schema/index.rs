//! Index declarations.

use super::cache::IndexCache;
use super::tuning::column_tuning;
use crate::config::Media;
use crate::error::{CoreError, CoreResult};
use crate::key;
use crate::types::{Order, SCOPE_LEN};
use shardex_storage::ColumnTuning;
use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Extracts index bytes from a type-erased entity.
pub(crate) type KeyFn = Arc<dyn Fn(&dyn Any) -> Option<Vec<u8>> + Send + Sync>;

/// Decides whether a type-erased entity belongs to a partition.
pub(crate) type MatchFn = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Flags of one index declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Ordering of the index.
    pub order: Order,
    /// Whether the index stores bodies rather than pointers.
    pub has_value: bool,
    /// Whether ordered scans delete superseded revisions they meet.
    pub auto_remove: bool,
    /// Capacity of the body cache. Only unordered indexes may cache.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Keep every index and filter block in table reader memory instead of
    /// the shared block cache.
    pub cache_all_index_blocks: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            order: Order::None,
            has_value: false,
            auto_remove: true,
            cache_capacity: None,
            cache_all_index_blocks: false,
        }
    }
}

impl IndexOptions {
    /// Creates options for an index with the given ordering.
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Sets whether the index stores bodies.
    #[must_use]
    pub const fn with_value(mut self, value: bool) -> Self {
        self.has_value = value;
        self
    }

    /// Sets delete-on-read of superseded revisions.
    #[must_use]
    pub const fn auto_remove(mut self, value: bool) -> Self {
        self.auto_remove = value;
        self
    }

    /// Caches up to `capacity` bodies. A capacity of 0 disables the cache.
    #[must_use]
    pub const fn cache(mut self, capacity: usize) -> Self {
        self.cache_capacity = NonZeroUsize::new(capacity);
        self
    }

    /// Sets whether all index blocks stay out of the block cache.
    #[must_use]
    pub const fn cache_all_index_blocks(mut self, value: bool) -> Self {
        self.cache_all_index_blocks = value;
        self
    }
}

/// One value of a partitioned index.
#[derive(Clone)]
pub(crate) struct Partition {
    pub(crate) value: String,
    pub(crate) matches: MatchFn,
}

/// One declared index of an entity kind, backed by its own column.
pub struct EntityIndex {
    name: String,
    column: String,
    options: IndexOptions,
    partition: Option<Partition>,
    cache: Option<IndexCache>,
    key_fn: KeyFn,
}

impl EntityIndex {
    pub(crate) fn new(
        kind: &str,
        name: String,
        options: IndexOptions,
        partition: Option<Partition>,
        key_fn: KeyFn,
    ) -> Self {
        Self {
            column: format!("{kind}-{name}"),
            name,
            cache: options.cache_capacity.map(IndexCache::new),
            options,
            partition,
            key_fn,
        }
    }

    /// Index name, including its ordering, e.g. `Primary-None`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column holding the index records.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Ordering of the index.
    #[must_use]
    pub fn order(&self) -> Order {
        self.options.order
    }

    /// Whether the index stores bodies.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.options.has_value
    }

    /// Whether ordered scans delete superseded revisions.
    #[must_use]
    pub fn auto_remove(&self) -> bool {
        self.options.auto_remove
    }

    /// Length of the key prefix records are grouped by in storage.
    #[must_use]
    pub fn prefix_length(&self) -> usize {
        SCOPE_LEN
    }

    /// The declaration flags.
    #[must_use]
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Partition value, for partitioned indexes.
    #[must_use]
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_ref().map(|p| p.value.as_str())
    }

    /// Whether the index only accepts the entities of one partition.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        self.partition.is_some()
    }

    /// The body cache, if the index has one.
    #[must_use]
    pub fn cache(&self) -> Option<&IndexCache> {
        self.cache.as_ref()
    }

    /// Physical tuning of the index column for the given media.
    #[must_use]
    pub fn tuning(&self, media: Media) -> ColumnTuning {
        column_tuning(self.order(), self.options.cache_all_index_blocks, media)
    }

    /// Whether the index holds records for `entity`.
    pub(crate) fn accepts(&self, entity: &dyn Any) -> bool {
        self.partition
            .as_ref()
            .map_or(true, |partition| (partition.matches)(entity))
    }

    /// Builds the key prefix of `entity` in this index.
    pub(crate) fn make_key(
        &self,
        scope: &[u8],
        entity: &dyn Any,
        position: Option<i64>,
    ) -> CoreResult<Vec<u8>> {
        let index_bytes = (self.key_fn)(entity).ok_or_else(|| {
            CoreError::configuration(format!(
                "index {} was declared for another entity type",
                self.column
            ))
        })?;
        key::make_key(scope, self.order(), position, &index_bytes).map_err(|err| match err {
            CoreError::Usage { message } => {
                CoreError::usage(format!("index {} is ordered: {message}", self.column))
            }
            other => other,
        })
    }
}

impl fmt::Debug for EntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityIndex")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("options", &self.options)
            .field("partition", &self.partition())
            .finish_non_exhaustive()
    }
}
