//! Column tuning derived from index flags.

use crate::config::Media;
use crate::types::{Order, SCOPE_LEN};
use shardex_storage::{ColumnTuning, Compression};

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Derives the physical tuning of an index column.
///
/// Unordered columns serve point lookups, so their bloom filters cover
/// whole keys. Ordered columns are scanned by scope prefix only.
#[must_use]
pub fn column_tuning(order: Order, cache_all_index_blocks: bool, media: Media) -> ColumnTuning {
    let (block_size, base) = match media {
        Media::Ssd => (16 * KIB, 256 * MIB),
        Media::Spinning => (64 * KIB, 512 * MIB),
    };
    ColumnTuning {
        block_size,
        bloom_bits_per_key: 10.0,
        whole_key_filtering: !order.is_ordered(),
        hash_index: true,
        prefix_length: SCOPE_LEN,
        cache_index_and_filter_blocks: !cache_all_index_blocks,
        write_buffer_size: base,
        max_write_buffer_number: 5,
        min_write_buffer_number_to_merge: 2,
        level0_file_num_compaction_trigger: 10,
        target_file_size_base: base as u64,
        max_bytes_for_level_base: base as u64 * 10,
        memtable_prefix_bloom_ratio: 0.25,
        compaction_readahead_size: 64 * MIB,
        compression_per_level: vec![
            Compression::None,
            Compression::None,
            Compression::Lz4,
            Compression::Lz4,
            Compression::Lz4,
            Compression::Zstd,
            Compression::Zstd,
            Compression::Zstd,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_drives_block_and_base_sizes() {
        let ssd = column_tuning(Order::None, false, Media::Ssd);
        assert_eq!(ssd.block_size, 16 * KIB);
        assert_eq!(ssd.write_buffer_size, 256 * MIB);
        assert_eq!(ssd.max_bytes_for_level_base, 2560 * MIB as u64);

        let spinning = column_tuning(Order::None, false, Media::Spinning);
        assert_eq!(spinning.block_size, 64 * KIB);
        assert_eq!(spinning.target_file_size_base, 512 * MIB as u64);
    }

    #[test]
    fn whole_key_filtering_only_when_unordered() {
        assert!(column_tuning(Order::None, false, Media::Ssd).whole_key_filtering);
        assert!(!column_tuning(Order::Ascending, false, Media::Ssd).whole_key_filtering);
        assert!(!column_tuning(Order::Descending, false, Media::Ssd).whole_key_filtering);
    }

    #[test]
    fn cache_all_keeps_index_blocks_out_of_block_cache() {
        assert!(column_tuning(Order::None, false, Media::Ssd).cache_index_and_filter_blocks);
        assert!(!column_tuning(Order::None, true, Media::Ssd).cache_index_and_filter_blocks);
    }

    #[test]
    fn compression_tiers_by_level() {
        let tuning = column_tuning(Order::Descending, false, Media::Ssd);
        assert_eq!(tuning.compression_per_level.len(), 8);
        assert_eq!(tuning.compression_per_level[0], Compression::None);
        assert_eq!(tuning.compression_per_level[2], Compression::Lz4);
        assert_eq!(tuning.compression_per_level[7], Compression::Zstd);
        assert_eq!(tuning.prefix_length, SCOPE_LEN);
    }
}
