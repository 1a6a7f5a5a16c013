//! Repository configuration.

use shardex_storage::RecoveryMode;
use std::path::PathBuf;

/// Default number of lock slots.
pub const DEFAULT_LOCK_SLOTS: usize = 10_000;

/// Default records visited by one ordered scan before it stops.
pub const DEFAULT_SCAN_CAP: usize = 1_000_000;

/// Storage media the repository runs on. Drives column tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Media {
    /// Solid state drive.
    #[default]
    Ssd,
    /// Rotational disk.
    Spinning,
}

/// Configuration for opening a repository.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one sub-directory per shard.
    pub root: PathBuf,

    /// How long obsolete log files are retained, in seconds (0 = engine default).
    pub wal_ttl_seconds: u64,

    /// Number of shards scopes are hashed across.
    pub shard_count: usize,

    /// Whether stores bypass the OS page cache.
    pub direct_io: bool,

    /// Log replay mode used when a store reopens after a crash.
    pub recovery: RecoveryMode,

    /// Storage media hint.
    pub media: Media,

    /// Number of binary slots in the scope lock.
    pub lock_slots: usize,

    /// Capacity of the block cache shared by every shard, in bytes.
    pub block_cache_bytes: usize,

    /// Maximum records one ordered scan visits.
    pub scan_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("shardex"),
            wal_ttl_seconds: 0,
            shard_count: 1,
            direct_io: false,
            recovery: RecoveryMode::default(),
            media: Media::Ssd,
            lock_slots: DEFAULT_LOCK_SLOTS,
            block_cache_bytes: 4 * 1024 * 1024 * 1024, // 4 GiB
            scan_cap: DEFAULT_SCAN_CAP,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage root.
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets log retention.
    #[must_use]
    pub const fn wal_ttl_seconds(mut self, seconds: u64) -> Self {
        self.wal_ttl_seconds = seconds;
        self
    }

    /// Sets the shard count.
    #[must_use]
    pub const fn shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Sets direct I/O.
    #[must_use]
    pub const fn direct_io(mut self, value: bool) -> Self {
        self.direct_io = value;
        self
    }

    /// Sets the recovery mode.
    #[must_use]
    pub const fn recovery(mut self, mode: RecoveryMode) -> Self {
        self.recovery = mode;
        self
    }

    /// Sets the media hint.
    #[must_use]
    pub const fn media(mut self, media: Media) -> Self {
        self.media = media;
        self
    }

    /// Sets the number of lock slots.
    #[must_use]
    pub const fn lock_slots(mut self, slots: usize) -> Self {
        self.lock_slots = slots;
        self
    }

    /// Sets the shared block cache capacity.
    #[must_use]
    pub const fn block_cache_bytes(mut self, bytes: usize) -> Self {
        self.block_cache_bytes = bytes;
        self
    }

    /// Sets the per-scan record cap.
    #[must_use]
    pub const fn scan_cap(mut self, records: usize) -> Self {
        self.scan_cap = records;
        self
    }

    /// Directory of one shard.
    #[must_use]
    pub fn shard_dir(&self, shard: usize) -> PathBuf {
        self.root.join(shard.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.shard_count, 1);
        assert_eq!(config.lock_slots, DEFAULT_LOCK_SLOTS);
        assert_eq!(config.scan_cap, DEFAULT_SCAN_CAP);
        assert_eq!(config.media, Media::Ssd);
        assert!(!config.direct_io);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .root("/data/feeds")
            .shard_count(8)
            .media(Media::Spinning)
            .recovery(RecoveryMode::AbsoluteConsistency)
            .wal_ttl_seconds(3600);

        assert_eq!(config.shard_count, 8);
        assert_eq!(config.media, Media::Spinning);
        assert_eq!(config.recovery, RecoveryMode::AbsoluteConsistency);
        assert_eq!(config.wal_ttl_seconds, 3600);
        assert_eq!(config.shard_dir(3), PathBuf::from("/data/feeds/3"));
    }
}
