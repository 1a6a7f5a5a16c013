//! Store trait definitions.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use crate::options::{ColumnSpec, InstanceOptions};
use std::sync::Arc;

/// A key/value pair as returned by a scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A forward iterator over the records of one column.
pub type KvIter<'a> = Box<dyn Iterator<Item = StorageResult<KvPair>> + 'a>;

/// An ordered key-value store split into named columns.
///
/// Stores are **opaque ordered byte maps**. Keys within a column are ordered
/// lexicographically by their bytes. The entity layer owns the meaning of
/// every key and value.
///
/// # Invariants
///
/// - `write` applies every operation of a batch or none of them
/// - `scan_prefix` yields keys in ascending byte order
/// - A scan never yields a key that does not start with its prefix
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - `RocksStore` - For persistent storage
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key` in `column`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the engine fails.
    fn get(&self, column: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Applies a batch of writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if any column addressed by the batch does not exist
    /// or the engine fails. Nothing is applied in that case.
    fn write(&self, batch: &WriteBatch) -> StorageResult<()>;

    /// Iterates forward over the records of `column` whose key starts with
    /// `prefix`, beginning at the first key `>= from`.
    ///
    /// A `from` ordered before `prefix` starts the scan at `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist. Failures met while
    /// iterating are yielded as items.
    fn scan_prefix<'a>(&'a self, column: &str, prefix: &[u8], from: &[u8])
        -> StorageResult<KvIter<'a>>;

    /// Returns the names of the columns this store was opened with.
    fn columns(&self) -> Vec<String>;

    /// Returns engine statistics, when the engine collects any.
    fn statistics(&self) -> Option<String> {
        None
    }
}

/// Opens stores for shard instances.
///
/// One factory is shared by every shard of a repository, so engine-wide
/// resources such as a block cache live on the factory.
pub trait StoreFactory: Send + Sync {
    /// Opens (creating when missing) the store of one shard with exactly the
    /// given columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    fn open(&self, options: &InstanceOptions, columns: &[ColumnSpec])
        -> StorageResult<Arc<dyn KvStore>>;
}

/// Returns the first key a prefix scan should visit.
pub(crate) fn scan_start(prefix: &[u8], from: &[u8]) -> Vec<u8> {
    if from < prefix {
        prefix.to_vec()
    } else {
        from.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_start_clamps_to_prefix() {
        assert_eq!(scan_start(b"ab", b"a"), b"ab".to_vec());
        assert_eq!(scan_start(b"ab", b""), b"ab".to_vec());
    }

    #[test]
    fn scan_start_keeps_later_seek() {
        assert_eq!(scan_start(b"ab", b"abz"), b"abz".to_vec());
        assert_eq!(scan_start(b"ab", b"ab"), b"ab".to_vec());
    }
}
