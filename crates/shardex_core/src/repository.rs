//! Repository facade.

use crate::codec::{BodyCodec, JsonCodec};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lock::ScopeLock;
use crate::schema::Schema;
use crate::shard::{Instance, ShardSet};
use crate::transaction::{SharedBatch, Transaction, TransactionSet};
use crate::types::ScopeKey;
use shardex_storage::{MemoryStoreFactory, StoreFactory};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

struct Shared {
    config: Config,
    schema: Arc<Schema>,
    shards: ShardSet,
    lock: ScopeLock,
}

/// The entry point: a schema served over a set of shard stores.
///
/// Cloning is cheap; clones share the stores, caches and scope lock.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use shardex_core::{Config, Entity, EntityId, IndexOptions, Order, Repository, Schema};
///
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     id: EntityId,
///     text: String,
/// }
///
/// impl Entity for Note {
///     fn entity_id(&self) -> EntityId {
///         self.id
///     }
/// }
///
/// let mut builder = Schema::builder();
/// let notes = builder.declare("Note", |n: &Note| n.id.as_bytes().to_vec(), IndexOptions::new(Order::None));
/// let repo = Repository::open_in_memory(Config::new(), builder.build()?)?;
///
/// let mut note = Note { id: EntityId::new(), text: "hello".into() };
/// repo.transaction("user-1", |txn| txn.save_entity(&notes, &mut note).map(drop))?;
///
/// let txn = repo.create_transaction("user-1")?;
/// let found = txn.try_get_entity(&notes, &note, Order::None)?;
/// assert_eq!(found.map(|n| n.text), Some("hello".to_string()));
/// # Ok::<(), shardex_core::CoreError>(())
/// ```
#[derive(Clone)]
pub struct Repository<C: BodyCodec = JsonCodec> {
    inner: Arc<Shared>,
    codec: C,
}

impl Repository<JsonCodec> {
    /// Opens one store per shard through `factory`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero shard count and propagates
    /// store failures.
    pub fn open(config: Config, schema: Arc<Schema>, factory: &dyn StoreFactory) -> CoreResult<Self> {
        let shards = ShardSet::create(&config, &schema, factory)?;
        Ok(Self::from_shards(config, schema, shards))
    }

    /// Opens a repository whose shards live in memory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero shard count.
    pub fn open_in_memory(config: Config, schema: Arc<Schema>) -> CoreResult<Self> {
        Self::open(config, schema, &MemoryStoreFactory::new())
    }

    /// Opens a repository over RocksDB, one database per shard under
    /// `config.root`, sharing a block cache of `config.block_cache_bytes`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero shard count and propagates
    /// engine failures.
    #[cfg(feature = "rocksdb")]
    pub fn open_rocksdb(config: Config, schema: Arc<Schema>) -> CoreResult<Self> {
        let factory = shardex_storage::RocksStoreFactory::new(config.block_cache_bytes);
        Self::open(config, schema, &factory)
    }

    /// Serves `schema` over already opened shards.
    #[must_use]
    pub fn from_shards(config: Config, schema: Arc<Schema>, shards: ShardSet) -> Self {
        tracing::debug!(
            shards = shards.shard_count(),
            kinds = schema.kinds().len(),
            lock_slots = config.lock_slots,
            "repository open"
        );
        Self {
            inner: Arc::new(Shared {
                lock: ScopeLock::new(config.lock_slots),
                config,
                schema,
                shards,
            }),
            codec: JsonCodec,
        }
    }
}

impl<C: BodyCodec> Repository<C> {
    /// Switches the body codec used by new transactions.
    #[must_use]
    pub fn with_codec<D: BodyCodec>(self, codec: D) -> Repository<D> {
        Repository {
            inner: self.inner,
            codec,
        }
    }

    /// The schema being served.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// The configuration the repository was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.inner.shards.shard_count()
    }

    /// The shard instances.
    #[must_use]
    pub fn shards(&self) -> &ShardSet {
        &self.inner.shards
    }

    /// Instance of one shard.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if no instance serves `shard`.
    pub fn instance(&self, shard: usize) -> CoreResult<Arc<Instance>> {
        self.try_instance(shard)
            .ok_or_else(|| CoreError::shard_not_found(shard, "-"))
    }

    /// Instance of one shard, if open.
    #[must_use]
    pub fn try_instance(&self, shard: usize) -> Option<Arc<Instance>> {
        self.inner.shards.get(shard).cloned()
    }

    /// Instance serving `scope`, with its shard number.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if the scope's shard is not open.
    pub fn resolve(&self, scope: &ScopeKey) -> CoreResult<(Arc<Instance>, usize)> {
        self.inner.shards.resolve(scope)
    }

    /// Engine statistics of one shard, when its store collects any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if no instance serves `shard`.
    pub fn statistics(&self, shard: usize) -> CoreResult<Option<String>> {
        Ok(self.instance(shard)?.statistics())
    }

    /// The scope lock shared by every clone of this repository.
    #[must_use]
    pub fn lock(&self) -> &ScopeLock {
        &self.inner.lock
    }

    fn transaction_on(&self, scope: ScopeKey, instance: Arc<Instance>, pending: SharedBatch) -> Transaction<C> {
        Transaction::new(
            Arc::clone(&self.inner.schema),
            instance,
            scope,
            pending,
            self.codec.clone(),
            self.inner.config.scan_cap,
        )
    }

    /// Starts a transaction on `scope` without taking the scope lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if the scope's shard is not open.
    pub fn create_transaction(&self, scope: impl Into<ScopeKey>) -> CoreResult<Transaction<C>> {
        let scope = scope.into();
        let (instance, _) = self.resolve(&scope)?;
        Ok(self.transaction_on(scope, instance, SharedBatch::default()))
    }

    /// Runs `f` in an unlocked transaction on `scope` and commits it if `f`
    /// succeeds. Nothing is written if `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of the commit.
    pub fn transaction<F, R>(&self, scope: impl Into<ScopeKey>, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction<C>) -> CoreResult<R>,
    {
        let mut txn = self.create_transaction(scope)?;
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }

    /// Waits for exclusive access to `scope`, then starts a transaction
    /// holding it. Dropping the transaction releases the scope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if the scope's shard is not open.
    /// Nothing is waited for in that case.
    pub async fn wait_transaction(&self, scope: impl Into<ScopeKey>) -> CoreResult<Transaction<C>> {
        let scope = scope.into();
        let (instance, _) = self.resolve(&scope)?;
        let release = self.inner.lock.acquire([&scope]).await;
        tracing::trace!(%scope, "scope acquired");
        Ok(self
            .transaction_on(scope, instance, SharedBatch::default())
            .with_release(release))
    }

    /// Waits for exclusive access to every scope, then starts one
    /// transaction per distinct scope. Scopes on the same shard share a
    /// batch.
    ///
    /// The scopes are taken together: the call never holds some of them
    /// while waiting for the rest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if any scope's shard is not
    /// open. Nothing is waited for in that case.
    pub async fn wait_transactions<I, S>(&self, scopes: I) -> CoreResult<TransactionSet<C>>
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeKey>,
    {
        let mut seen = HashSet::new();
        let mut routed = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            if seen.insert(scope.clone()) {
                let (instance, shard) = self.resolve(&scope)?;
                routed.push((scope, instance, shard));
            }
        }

        let release = self.inner.lock.acquire(routed.iter().map(|(scope, _, _)| scope)).await;

        let mut batches: BTreeMap<usize, (Arc<Instance>, SharedBatch)> = BTreeMap::new();
        let mut members = Vec::with_capacity(routed.len());
        for (scope, instance, shard) in routed {
            let pending = Arc::clone(
                &batches
                    .entry(shard)
                    .or_insert_with(|| (Arc::clone(&instance), SharedBatch::default()))
                    .1,
            );
            members.push(self.transaction_on(scope, instance, pending));
        }
        tracing::trace!(scopes = members.len(), shards = batches.len(), "scopes acquired");
        Ok(TransactionSet::new(
            Arc::clone(&self.inner.schema),
            members,
            batches,
            release,
        ))
    }
}

impl<C: BodyCodec> fmt::Debug for Repository<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.inner.config.root)
            .field("shards", &self.inner.shards.shard_count())
            .field("kinds", &self.inner.schema.kinds().len())
            .field("lock", &self.inner.lock)
            .finish_non_exhaustive()
    }
}
