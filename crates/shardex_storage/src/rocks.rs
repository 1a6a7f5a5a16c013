//! RocksDB-backed store.

use crate::backend::{scan_start, KvIter, KvStore, StoreFactory};
use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::options::{ColumnSpec, ColumnTuning, Compression, InstanceOptions, RecoveryMode};
use rocksdb::{
    BlockBasedIndexType, BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor,
    DBCompressionType, DBRecoveryMode, Direction, IteratorMode, Options, ReadOptions,
    SliceTransform, DB,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Opens [`RocksStore`]s that share one block cache.
pub struct RocksStoreFactory {
    cache: Cache,
}

impl RocksStoreFactory {
    /// Creates a factory whose stores share a block cache of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Cache::new_lru_cache(capacity),
        }
    }
}

impl std::fmt::Debug for RocksStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStoreFactory").finish_non_exhaustive()
    }
}

impl StoreFactory for RocksStoreFactory {
    fn open(
        &self,
        options: &InstanceOptions,
        columns: &[ColumnSpec],
    ) -> StorageResult<Arc<dyn KvStore>> {
        let store = RocksStore::open(options, columns, &self.cache)?;
        Ok(Arc::new(store))
    }
}

/// A store backed by one RocksDB instance, one column family per column.
pub struct RocksStore {
    db: DB,
    columns: Vec<String>,
}

impl RocksStore {
    /// Opens the instance described by `options`, creating it and any
    /// missing column families.
    ///
    /// Column families found on disk but absent from `columns` are opened
    /// with default options so the database stays openable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or RocksDB
    /// refuses to open.
    pub fn open(
        options: &InstanceOptions,
        columns: &[ColumnSpec],
        cache: &Cache,
    ) -> StorageResult<Self> {
        let data_dir = options.data_dir();
        let wal_dir = options.wal_dir();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&wal_dir)?;

        let db_options = instance_options(options);

        let declared: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let existing = DB::list_cf(&db_options, &data_dir).unwrap_or_default();

        let mut descriptors: Vec<ColumnFamilyDescriptor> = columns
            .iter()
            .map(|spec| ColumnFamilyDescriptor::new(&spec.name, column_options(&spec.tuning, cache)))
            .collect();
        for name in existing {
            if !declared.contains(name.as_str()) && name != rocksdb::DEFAULT_COLUMN_FAMILY_NAME {
                tracing::warn!(shard = options.shard, column = %name, "opening undeclared column");
                descriptors.push(ColumnFamilyDescriptor::new(name, Options::default()));
            }
        }

        let db = DB::open_cf_descriptors(&db_options, &data_dir, descriptors)?;
        tracing::debug!(
            shard = options.shard,
            path = %data_dir.display(),
            columns = columns.len(),
            "opened rocksdb instance"
        );

        Ok(Self {
            db,
            columns: columns.iter().map(|c| c.name.clone()).collect(),
        })
    }

    fn handle(&self, column: &str) -> StorageResult<&ColumnFamily> {
        self.db
            .cf_handle(column)
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()))
    }
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("columns", &self.columns)
            .finish()
    }
}

impl KvStore for RocksStore {
    fn get(&self, column: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.handle(column)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn write(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut native = rocksdb::WriteBatch::default();
        for op in batch.ops() {
            let cf = self.handle(op.column())?;
            match op {
                BatchOp::Put { key, value, .. } => native.put_cf(cf, key, value),
                BatchOp::Delete { key, .. } => native.delete_cf(cf, key),
                BatchOp::DeleteRange { column, from, to } => {
                    if from > to {
                        return Err(StorageError::InvalidRange {
                            column: column.clone(),
                        });
                    }
                    native.delete_range_cf(cf, from, to);
                }
            }
        }
        self.db.write(native)?;
        Ok(())
    }

    fn scan_prefix<'a>(
        &'a self,
        column: &str,
        prefix: &[u8],
        from: &[u8],
    ) -> StorageResult<KvIter<'a>> {
        let cf = self.handle(column)?;
        let start = scan_start(prefix, from);
        let mut read = ReadOptions::default();
        read.set_total_order_seek(true);

        let prefix = prefix.to_vec();
        let iter = self
            .db
            .iterator_cf_opt(cf, read, IteratorMode::From(&start, Direction::Forward))
            .map(|item| {
                item.map(|(key, value)| (key.into_vec(), value.into_vec()))
                    .map_err(StorageError::from)
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }

    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn statistics(&self) -> Option<String> {
        match self.db.property_value("rocksdb.stats") {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read rocksdb statistics");
                None
            }
        }
    }
}

fn instance_options(options: &InstanceOptions) -> Options {
    let mut db = Options::default();
    db.create_if_missing(true);
    db.create_missing_column_families(true);
    db.set_max_open_files(-1);
    db.set_max_background_jobs(options.background_jobs());
    db.set_table_cache_num_shard_bits(8);
    db.set_allow_concurrent_memtable_write(false);
    db.set_wal_dir(options.wal_dir());
    db.set_wal_ttl_seconds(options.wal_ttl_seconds);
    db.set_wal_recovery_mode(recovery_mode(options.recovery));
    db.set_use_direct_reads(options.direct_io);
    db.set_use_direct_io_for_flush_and_compaction(options.direct_io);
    db.enable_statistics();
    db
}

fn column_options(tuning: &ColumnTuning, cache: &Cache) -> Options {
    let mut table = BlockBasedOptions::default();
    table.set_block_cache(cache);
    table.set_block_size(tuning.block_size);
    table.set_bloom_filter(tuning.bloom_bits_per_key, false);
    table.set_whole_key_filtering(tuning.whole_key_filtering);
    if tuning.hash_index {
        table.set_index_type(BlockBasedIndexType::HashSearch);
    }
    table.set_format_version(4);
    table.set_pin_l0_filter_and_index_blocks_in_cache(true);
    table.set_cache_index_and_filter_blocks(tuning.cache_index_and_filter_blocks);
    table.set_pin_top_level_index_and_filter(tuning.cache_index_and_filter_blocks);

    let mut column = Options::default();
    column.set_block_based_table_factory(&table);
    if tuning.prefix_length > 0 {
        column.set_prefix_extractor(SliceTransform::create_fixed_prefix(tuning.prefix_length));
        column.set_memtable_prefix_bloom_ratio(tuning.memtable_prefix_bloom_ratio);
    }
    column.set_write_buffer_size(tuning.write_buffer_size);
    column.set_max_write_buffer_number(tuning.max_write_buffer_number);
    column.set_min_write_buffer_number_to_merge(tuning.min_write_buffer_number_to_merge);
    column.set_level_zero_file_num_compaction_trigger(tuning.level0_file_num_compaction_trigger);
    column.set_target_file_size_base(tuning.target_file_size_base);
    column.set_max_bytes_for_level_base(tuning.max_bytes_for_level_base);
    column.set_level_compaction_dynamic_level_bytes(true);
    column.set_compaction_readahead_size(tuning.compaction_readahead_size);
    if !tuning.compression_per_level.is_empty() {
        let levels: Vec<DBCompressionType> = tuning
            .compression_per_level
            .iter()
            .map(|c| compression(*c))
            .collect();
        column.set_compression_per_level(&levels);
    }
    column
}

const fn compression(value: Compression) -> DBCompressionType {
    match value {
        Compression::None => DBCompressionType::None,
        Compression::Snappy => DBCompressionType::Snappy,
        Compression::Lz4 => DBCompressionType::Lz4,
        Compression::Zstd => DBCompressionType::Zstd,
    }
}

const fn recovery_mode(value: RecoveryMode) -> DBRecoveryMode {
    match value {
        RecoveryMode::TolerateCorruptedTailRecords => DBRecoveryMode::TolerateCorruptedTailRecords,
        RecoveryMode::AbsoluteConsistency => DBRecoveryMode::AbsoluteConsistency,
        RecoveryMode::PointInTime => DBRecoveryMode::PointInTime,
        RecoveryMode::SkipAnyCorruptedRecords => DBRecoveryMode::SkipAnyCorruptedRecord,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, columns: &[&str]) -> Arc<dyn KvStore> {
        let factory = RocksStoreFactory::new(8 * 1024 * 1024);
        let options = InstanceOptions::new(0, dir.path().join("0"));
        let specs: Vec<ColumnSpec> = columns.iter().map(|c| ColumnSpec::new(*c)).collect();
        factory.open(&options, &specs).unwrap()
    }

    #[test]
    fn rocks_put_get_and_range_delete() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, &["c"]);

        let mut batch = WriteBatch::new();
        for key in [b"a", b"b", b"c"] {
            batch.put("c", key.to_vec(), b"x".to_vec());
        }
        store.write(&batch).unwrap();
        assert_eq!(store.get("c", b"b").unwrap(), Some(b"x".to_vec()));

        let mut batch = WriteBatch::new();
        batch.delete_range("c", b"a".to_vec(), b"c".to_vec());
        store.write(&batch).unwrap();

        let keys: Vec<_> = store
            .scan_prefix("c", b"", b"")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"c".to_vec()]);
    }

    #[test]
    fn rocks_scan_stops_at_prefix_end() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, &["c"]);

        let mut batch = WriteBatch::new();
        for key in [&b"a1"[..], b"b1", b"b2", b"c1"] {
            batch.put("c", key.to_vec(), vec![]);
        }
        store.write(&batch).unwrap();

        let keys: Vec<_> = store
            .scan_prefix("c", b"b", b"b2")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"b2".to_vec()]);
    }

    #[test]
    fn rocks_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir, &["c"]);
            let mut batch = WriteBatch::new();
            batch.put("c", b"k".to_vec(), b"v".to_vec());
            store.write(&batch).unwrap();
        }
        let store = open(&dir, &["c", "d"]);
        assert_eq!(store.get("c", b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("d", b"k").unwrap(), None);
    }

    #[test]
    fn rocks_unknown_column_fails() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, &["c"]);
        assert!(matches!(
            store.get("nope", b"k"),
            Err(StorageError::ColumnNotFound(_))
        ));
    }
}
