//! # Shardex Core
//!
//! Typed entities and their indexes over sharded, ordered key-value stores.
//!
//! This crate provides:
//! - A byte-key codec for scoped, optionally position-ordered index keys
//! - A schema registry of entity kinds, indexes and index partitions
//! - Shard routing of scopes and one store instance per shard
//! - An async scope lock granting exclusive access to sets of scopes
//! - Transactions with buffered, atomic writes and ordered scans that
//!   clean up superseded revisions as they read
//!
//! Storage is reached through the [`shardex_storage`] traits; in-memory
//! stores are always available and RocksDB stores come with the `rocksdb`
//! feature.
//!
//! ## Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use shardex_core::{Config, Entity, EntityId, IndexOptions, Order, Repository, Schema};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Post {
//!     id: EntityId,
//!     position: i64,
//!     text: String,
//! }
//!
//! impl Entity for Post {
//!     fn entity_id(&self) -> EntityId {
//!         self.id
//!     }
//!     fn position(&self) -> Option<i64> {
//!         Some(self.position)
//!     }
//!     fn set_position(&mut self, position: i64) {
//!         self.position = position;
//!     }
//! }
//!
//! let mut builder = Schema::builder();
//! let posts = builder.declare("Post", |p: &Post| p.id.as_bytes().to_vec(), IndexOptions::new(Order::None));
//! builder.declare_index(&posts, "Feed", |p: &Post| p.id.as_bytes().to_vec(), IndexOptions::new(Order::Descending));
//! let repo = Repository::open_in_memory(Config::new(), builder.build()?)?;
//!
//! let mut txn = repo.create_transaction("user-1")?;
//! for text in ["first", "second"] {
//!     let mut post = Post { id: EntityId::new(), position: 0, text: text.into() };
//!     txn.set_next_position(&mut post);
//!     txn.save_entity(&posts, &mut post)?;
//! }
//! txn.commit()?;
//!
//! let feed: Vec<Post> = txn
//!     .get_entities(&posts, 0, Order::Descending)?
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(feed[0].text, "second");
//! # Ok::<(), shardex_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod entity;
mod error;
pub mod key;
mod lock;
mod repository;
pub mod schema;
mod shard;
mod transaction;
mod types;

pub use codec::{BodyCodec, CborCodec, JsonCodec};
pub use config::{Config, Media, DEFAULT_LOCK_SLOTS, DEFAULT_SCAN_CAP};
pub use entity::{Entity, EntityId};
pub use error::{CoreError, CoreResult};
pub use key::FieldTag;
pub use lock::{ReleaseHandle, ScopeLock};
pub use repository::Repository;
pub use schema::{
    EntityIndex, EntityKind, IndexHandle, IndexOptions, Kind, KindId, Schema, SchemaBuilder,
    PRIMARY_INDEX,
};
pub use shard::{scope_hash, Instance, ShardSet};
pub use transaction::{EntityScan, Transaction, TransactionSet, TransactionState};
pub use types::{
    positions, Order, ScopeKey, INDEX_LEN, ORDERED_INDEX_LEN, POSITION_LEN, SCOPE_LEN,
};

pub use shardex_storage::{
    KvStore, MemoryStore, MemoryStoreFactory, RecoveryMode, StorageError, StoreFactory,
};
