//! Shared fixtures for shardex benchmarks.

#![allow(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shardex_core::{Config, Entity, EntityId, IndexOptions, Kind, Order, Repository, Schema};

/// A feed item with a random payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    pub position: i64,
    pub payload: String,
}

impl Entity for Item {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

/// Random alphanumeric text of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Items at positions `1..=count`.
pub fn generate_items(count: usize, payload_len: usize) -> Vec<Item> {
    (1..=count as i64)
        .map(|position| Item {
            id: EntityId::new(),
            position,
            payload: random_text(payload_len),
        })
        .collect()
}

/// An in-memory repository with an unordered value index and a descending
/// pointer index on items.
pub fn feed_repository(shards: usize) -> (Repository, Kind<Item>) {
    let mut builder = Schema::builder();
    let items = builder.declare(
        "Item",
        |item: &Item| item.id.as_bytes().to_vec(),
        IndexOptions::new(Order::None),
    );
    builder.declare_index(
        &items,
        "Feed",
        |item: &Item| item.id.as_bytes().to_vec(),
        IndexOptions::new(Order::Descending),
    );
    let schema = builder.build().unwrap();
    let repo = Repository::open_in_memory(Config::new().shard_count(shards), schema).unwrap();
    (repo, items)
}

/// Saves `items` into `scope` in one transaction.
pub fn populate(repo: &Repository, kind: &Kind<Item>, scope: &str, items: &mut [Item]) {
    repo.transaction(scope, |txn| {
        for item in items.iter_mut() {
            txn.save_entity(kind, item)?;
        }
        Ok(())
    })
    .unwrap();
}
