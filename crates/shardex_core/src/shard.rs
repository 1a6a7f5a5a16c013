//! Shard instances and scope routing.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::types::ScopeKey;
use sha2::{Digest, Sha256};
use shardex_storage::{InstanceOptions, KvStore, StoreFactory};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable hash of a scope, shared by shard routing and lock slots.
///
/// Derived from SHA-256 so routing survives restarts and upgrades.
#[must_use]
pub fn scope_hash(scope: &[u8]) -> u64 {
    let digest = Sha256::digest(scope);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// One opened store and the shard it serves.
pub struct Instance {
    shard: usize,
    store: Arc<dyn KvStore>,
}

impl Instance {
    /// Wraps an opened store.
    #[must_use]
    pub fn new(shard: usize, store: Arc<dyn KvStore>) -> Self {
        Self { shard, store }
    }

    /// Shard number.
    #[must_use]
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// Engine statistics, when the store collects any.
    #[must_use]
    pub fn statistics(&self) -> Option<String> {
        self.store.statistics()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("shard", &self.shard)
            .field("columns", &self.store.columns())
            .finish()
    }
}

/// Every shard instance of a repository.
#[derive(Debug)]
pub struct ShardSet {
    instances: BTreeMap<usize, Arc<Instance>>,
    shard_count: usize,
}

impl ShardSet {
    /// Opens one instance per shard under `config.root`, each with exactly
    /// the columns of `schema`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero shard count and propagates
    /// store failures.
    pub fn create(config: &Config, schema: &Schema, factory: &dyn StoreFactory) -> CoreResult<Self> {
        if config.shard_count == 0 {
            return Err(CoreError::configuration("shard count must be at least 1"));
        }
        let columns = schema.columns(config.media);
        let mut instances = BTreeMap::new();
        for shard in 0..config.shard_count {
            let options = InstanceOptions {
                shard,
                directory: config.shard_dir(shard),
                wal_ttl_seconds: config.wal_ttl_seconds,
                recovery: config.recovery,
                direct_io: config.direct_io,
                sharded: config.shard_count > 1,
            };
            let store = factory.open(&options, &columns)?;
            tracing::debug!(shard, columns = columns.len(), "shard instance open");
            instances.insert(shard, Arc::new(Instance::new(shard, store)));
        }
        Ok(Self {
            instances,
            shard_count: config.shard_count,
        })
    }

    /// Builds a set from already opened instances.
    ///
    /// Scopes routed to a shard missing from `instances` fail with
    /// [`CoreError::ShardNotFound`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero shard count.
    pub fn from_instances(
        shard_count: usize,
        instances: impl IntoIterator<Item = Instance>,
    ) -> CoreResult<Self> {
        if shard_count == 0 {
            return Err(CoreError::configuration("shard count must be at least 1"));
        }
        Ok(Self {
            instances: instances
                .into_iter()
                .map(|instance| (instance.shard(), Arc::new(instance)))
                .collect(),
            shard_count,
        })
    }

    /// Number of shards scopes are hashed across.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Shard a scope routes to.
    #[must_use]
    pub fn shard_for(&self, scope: &ScopeKey) -> usize {
        (scope_hash(scope.as_bytes()) % self.shard_count as u64) as usize
    }

    /// Instance serving a scope, with its shard number.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShardNotFound`] if no instance serves the shard.
    pub fn resolve(&self, scope: &ScopeKey) -> CoreResult<(Arc<Instance>, usize)> {
        let shard = self.shard_for(scope);
        self.instances
            .get(&shard)
            .map(|instance| (Arc::clone(instance), shard))
            .ok_or_else(|| CoreError::shard_not_found(shard, scope.to_string()))
    }

    /// Instance of one shard.
    #[must_use]
    pub fn get(&self, shard: usize) -> Option<&Arc<Instance>> {
        self.instances.get(&shard)
    }

    /// Every instance, by shard number.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexOptions;
    use crate::types::Order;
    use crate::{Entity, EntityId};
    use shardex_storage::{MemoryStore, MemoryStoreFactory};

    struct Row(EntityId);

    impl Entity for Row {
        fn entity_id(&self) -> EntityId {
            self.0
        }
    }

    fn schema() -> Arc<Schema> {
        let mut builder = Schema::builder();
        builder.declare("Row", |r: &Row| r.0.as_bytes().to_vec(), IndexOptions::new(Order::None));
        builder.build().unwrap()
    }

    #[test]
    fn scope_hash_is_stable() {
        assert_eq!(scope_hash(b"abc"), scope_hash(b"abc"));
        assert_ne!(scope_hash(b"abc"), scope_hash(b"abd"));
        // First 8 bytes of SHA-256("abc")
        assert_eq!(scope_hash(b"abc"), 0xba78_16bf_8f01_cfea);
    }

    #[test]
    fn create_opens_every_shard_with_schema_columns() {
        let factory = MemoryStoreFactory::new();
        let config = Config::new().root("mem").shard_count(4);
        let shards = ShardSet::create(&config, &schema(), &factory).unwrap();

        assert_eq!(shards.iter().count(), 4);
        assert_eq!(factory.store_count(), 4);
        let instance = shards.get(2).unwrap();
        assert_eq!(instance.store().columns(), vec!["Row-Primary-None".to_string()]);
    }

    #[test]
    fn zero_shards_is_a_configuration_error() {
        let config = Config::new().shard_count(0);
        let err = ShardSet::create(&config, &schema(), &MemoryStoreFactory::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn routing_is_deterministic_and_in_range() {
        let config = Config::new().root("mem").shard_count(3);
        let shards = ShardSet::create(&config, &schema(), &MemoryStoreFactory::new()).unwrap();
        for i in 0..100u32 {
            let scope = ScopeKey::from(i.to_be_bytes().to_vec());
            let (instance, shard) = shards.resolve(&scope).unwrap();
            assert!(shard < 3);
            assert_eq!(instance.shard(), shard);
            assert_eq!(shards.shard_for(&scope), shard);
        }
    }

    #[test]
    fn missing_instance_is_not_found() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let shards = ShardSet::from_instances(2, [Instance::new(0, store)]).unwrap();
        let missing = (0..64u32)
            .map(|i| ScopeKey::from(i.to_be_bytes().to_vec()))
            .find(|scope| shards.shard_for(scope) == 1)
            .unwrap();
        assert!(matches!(
            shards.resolve(&missing),
            Err(CoreError::ShardNotFound { shard: 1, .. })
        ));
    }
}
