//! # Shardex Storage
//!
//! The ordered key-value store boundary used by shardex.
//!
//! Stores are **opaque ordered byte maps** split into named columns. They do
//! not interpret keys or values; the entity layer above owns the key layout.
//!
//! ## Design Principles
//!
//! - Columns are addressed by name and fixed when a store is opened
//! - Writes go through atomic [`WriteBatch`]es (put, delete, range delete)
//! - Reads are point lookups or forward, prefix-bounded scans
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral repositories
//! - `RocksStore` - RocksDB-backed store (requires the `rocksdb` feature)
//!
//! ## Example
//!
//! ```rust
//! use shardex_storage::{ColumnSpec, KvStore, MemoryStore, WriteBatch};
//!
//! let store = MemoryStore::with_columns(["people"]);
//! let mut batch = WriteBatch::new();
//! batch.put("people", b"ada".to_vec(), b"lovelace".to_vec());
//! store.write(&batch).unwrap();
//! assert_eq!(store.get("people", b"ada").unwrap(), Some(b"lovelace".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod memory;
mod options;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use backend::{KvIter, KvPair, KvStore, StoreFactory};
pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, MemoryStoreFactory};
pub use options::{ColumnSpec, ColumnTuning, Compression, InstanceOptions, RecoveryMode};
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksStore, RocksStoreFactory};
