//! In-memory ordered store for testing.

use crate::backend::{scan_start, KvIter, KvPair, KvStore, StoreFactory};
use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::options::{ColumnSpec, InstanceOptions};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;

/// Records fetched per lock acquisition while scanning.
const SCAN_CHUNK: usize = 256;

type Column = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory ordered store.
///
/// This store keeps every column in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral repositories that don't need persistence
///
/// # Thread Safety
///
/// The store is thread-safe. Scans re-acquire the read lock for every chunk
/// of records, so a caller may write to the store while holding a scan.
///
/// # Example
///
/// ```rust
/// use shardex_storage::{KvStore, MemoryStore, WriteBatch};
///
/// let store = MemoryStore::with_columns(["c"]);
/// let mut batch = WriteBatch::new();
/// batch.put("c", b"a1".to_vec(), b"x".to_vec());
/// batch.put("c", b"b1".to_vec(), b"y".to_vec());
/// store.write(&batch).unwrap();
///
/// let keys: Vec<_> = store
///     .scan_prefix("c", b"a", b"")
///     .unwrap()
///     .map(|r| r.unwrap().0)
///     .collect();
/// assert_eq!(keys, vec![b"a1".to_vec()]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    columns: RwLock<HashMap<String, Column>>,
}

impl MemoryStore {
    /// Creates a store without columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given empty columns.
    #[must_use]
    pub fn with_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for name in names {
            store.ensure_column(name);
        }
        store
    }

    /// Adds a column if it does not exist yet.
    pub fn ensure_column(&self, name: impl Into<String>) {
        self.columns.write().entry(name.into()).or_default();
    }

    /// Returns the number of records in a column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn len(&self, column: &str) -> StorageResult<usize> {
        self.columns
            .read()
            .get(column)
            .map(BTreeMap::len)
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()))
    }

    /// Returns a copy of every record of a column, in key order.
    ///
    /// Useful for testing and debugging.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn dump(&self, column: &str) -> StorageResult<Vec<KvPair>> {
        self.columns
            .read()
            .get(column)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()))
    }

    /// Fetches up to [`SCAN_CHUNK`] records following `after`.
    fn fetch(
        &self,
        column: &str,
        prefix: &[u8],
        after: Bound<&[u8]>,
    ) -> StorageResult<Vec<KvPair>> {
        let columns = self.columns.read();
        let records = columns
            .get(column)
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()))?;
        Ok(records
            .range::<[u8], _>((after, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(SCAN_CHUNK)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, column: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let columns = self.columns.read();
        let records = columns
            .get(column)
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn write(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut columns = self.columns.write();

        // Validate everything up front so a bad batch leaves no trace
        for op in batch.ops() {
            if !columns.contains_key(op.column()) {
                return Err(StorageError::ColumnNotFound(op.column().to_string()));
            }
            if let BatchOp::DeleteRange { column, from, to } = op {
                if from > to {
                    return Err(StorageError::InvalidRange {
                        column: column.clone(),
                    });
                }
            }
        }

        for op in batch.ops() {
            let Some(records) = columns.get_mut(op.column()) else {
                continue;
            };
            match op {
                BatchOp::Put { key, value, .. } => {
                    records.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key, .. } => {
                    records.remove(key);
                }
                BatchOp::DeleteRange { from, to, .. } => {
                    let doomed: Vec<Vec<u8>> = records
                        .range::<[u8], _>((
                            Bound::Included(from.as_slice()),
                            Bound::Excluded(to.as_slice()),
                        ))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in doomed {
                        records.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_prefix<'a>(
        &'a self,
        column: &str,
        prefix: &[u8],
        from: &[u8],
    ) -> StorageResult<KvIter<'a>> {
        if !self.columns.read().contains_key(column) {
            return Err(StorageError::ColumnNotFound(column.to_string()));
        }
        Ok(Box::new(MemoryScan {
            store: self,
            column: column.to_string(),
            prefix: prefix.to_vec(),
            start: Some(scan_start(prefix, from)),
            last: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self.columns.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// A chunked forward cursor over one column of a [`MemoryStore`].
struct MemoryScan<'a> {
    store: &'a MemoryStore,
    column: String,
    prefix: Vec<u8>,
    start: Option<Vec<u8>>,
    last: Option<Vec<u8>>,
    buffer: VecDeque<KvPair>,
    exhausted: bool,
}

impl MemoryScan<'_> {
    fn refill(&mut self) -> StorageResult<()> {
        let after = match (&self.start, &self.last) {
            (_, Some(last)) => Bound::Excluded(last.as_slice()),
            (Some(start), None) => Bound::Included(start.as_slice()),
            (None, None) => Bound::Unbounded,
        };
        let chunk = self.store.fetch(&self.column, &self.prefix, after)?;
        if chunk.len() < SCAN_CHUNK {
            self.exhausted = true;
        }
        if let Some((key, _)) = chunk.last() {
            self.last = Some(key.clone());
        }
        self.buffer.extend(chunk);
        Ok(())
    }
}

impl Iterator for MemoryScan<'_> {
    type Item = StorageResult<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.refill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Opens [`MemoryStore`]s, handing out the same store again when a shard
/// directory is reopened.
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    stores: Mutex<HashMap<PathBuf, Arc<MemoryStore>>>,
}

impl MemoryStoreFactory {
    /// Creates a factory with no stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct stores opened so far.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.lock().len()
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn open(
        &self,
        options: &InstanceOptions,
        columns: &[ColumnSpec],
    ) -> StorageResult<Arc<dyn KvStore>> {
        let mut stores = self.stores.lock();
        let store = stores
            .entry(options.directory.clone())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        for spec in columns {
            store.ensure_column(spec.name.clone());
        }
        tracing::debug!(
            shard = options.shard,
            columns = columns.len(),
            "opened in-memory store"
        );
        Ok(store)
    }
}
