//! Store and column configuration.

use std::path::PathBuf;

/// Block compression applied to one LSM level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Stored uncompressed.
    None,
    /// Snappy.
    Snappy,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

/// How the write-ahead log is replayed after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecoveryMode {
    /// Ignore incomplete records at the tail of the log.
    TolerateCorruptedTailRecords,
    /// Refuse to open on any log corruption.
    AbsoluteConsistency,
    /// Recover up to the first inconsistency.
    #[default]
    PointInTime,
    /// Skip every corrupted record.
    SkipAnyCorruptedRecords,
}

/// Physical tuning of one column.
///
/// Values are engine hints. Stores that have no use for a setting ignore it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTuning {
    /// Data block size in bytes.
    pub block_size: usize,
    /// Bloom filter bits per key.
    pub bloom_bits_per_key: f64,
    /// Whether the bloom filter covers whole keys as well as prefixes.
    pub whole_key_filtering: bool,
    /// Whether blocks carry a hash index for prefix lookups.
    pub hash_index: bool,
    /// Length of the fixed key prefix used by prefix seeks and filters.
    pub prefix_length: usize,
    /// Keep index and filter blocks in the block cache (and pin them) rather
    /// than in table reader memory.
    pub cache_index_and_filter_blocks: bool,
    /// Memtable size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of memtables.
    pub max_write_buffer_number: i32,
    /// Memtables merged together before flushing.
    pub min_write_buffer_number_to_merge: i32,
    /// Number of level-0 files that triggers a compaction.
    pub level0_file_num_compaction_trigger: i32,
    /// Target size of one table file.
    pub target_file_size_base: u64,
    /// Total size of level 1.
    pub max_bytes_for_level_base: u64,
    /// Size ratio of the memtable prefix bloom filter.
    pub memtable_prefix_bloom_ratio: f64,
    /// Readahead used by compactions, in bytes.
    pub compaction_readahead_size: usize,
    /// Compression per LSM level, level 0 first.
    pub compression_per_level: Vec<Compression>,
}

impl Default for ColumnTuning {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            bloom_bits_per_key: 10.0,
            whole_key_filtering: true,
            hash_index: false,
            prefix_length: 0,
            cache_index_and_filter_blocks: false,
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 2,
            min_write_buffer_number_to_merge: 1,
            level0_file_num_compaction_trigger: 4,
            target_file_size_base: 64 * 1024 * 1024,
            max_bytes_for_level_base: 256 * 1024 * 1024,
            memtable_prefix_bloom_ratio: 0.0,
            compaction_readahead_size: 0,
            compression_per_level: Vec::new(),
        }
    }
}

/// A column a store must open, with its tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Physical tuning.
    pub tuning: ColumnTuning,
}

impl ColumnSpec {
    /// Creates a column spec with default tuning.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tuning: ColumnTuning::default(),
        }
    }

    /// Replaces the tuning.
    #[must_use]
    pub fn with_tuning(mut self, tuning: ColumnTuning) -> Self {
        self.tuning = tuning;
        self
    }
}

/// Per-shard store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Shard number.
    pub shard: usize,
    /// Directory owned by this shard.
    pub directory: PathBuf,
    /// How long obsolete log files are kept, in seconds.
    pub wal_ttl_seconds: u64,
    /// Log replay mode.
    pub recovery: RecoveryMode,
    /// Bypass the OS page cache for reads, flushes and compactions.
    pub direct_io: bool,
    /// Whether the repository runs more than one shard.
    pub sharded: bool,
}

impl InstanceOptions {
    /// Creates options for `shard` rooted at `directory`.
    #[must_use]
    pub fn new(shard: usize, directory: impl Into<PathBuf>) -> Self {
        Self {
            shard,
            directory: directory.into(),
            wal_ttl_seconds: 0,
            recovery: RecoveryMode::default(),
            direct_io: false,
            sharded: false,
        }
    }

    /// Directory holding table files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.directory.join("data")
    }

    /// Directory holding write-ahead log files.
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        self.directory.join("wal")
    }

    /// Background flush and compaction threads for this instance.
    ///
    /// Sharded repositories run many instances side by side, so each one
    /// gets a small share.
    #[must_use]
    pub const fn background_jobs(&self) -> i32 {
        if self.sharded {
            2
        } else {
            12
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_dirs_live_under_shard_directory() {
        let options = InstanceOptions::new(3, "/var/lib/shardex/3");
        assert_eq!(options.data_dir(), PathBuf::from("/var/lib/shardex/3/data"));
        assert_eq!(options.wal_dir(), PathBuf::from("/var/lib/shardex/3/wal"));
    }

    #[test]
    fn background_jobs_shrink_when_sharded() {
        let mut options = InstanceOptions::new(0, "x");
        assert_eq!(options.background_jobs(), 12);
        options.sharded = true;
        assert_eq!(options.background_jobs(), 2);
    }

    #[test]
    fn column_spec_defaults() {
        let spec = ColumnSpec::new("people");
        assert_eq!(spec.name, "people");
        assert_eq!(spec.tuning, ColumnTuning::default());
    }
}
