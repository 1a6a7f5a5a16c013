//! The transaction engine.
//!
//! A [`Transaction`] buffers writes for one scope and reads straight from
//! the store. A [`TransactionSet`] groups transactions on several scopes
//! and commits them shard by shard.

mod pending;
mod scan;
mod scoped;
mod set;
mod state;

pub(crate) use pending::SharedBatch;
pub use scan::EntityScan;
pub use scoped::Transaction;
pub use set::TransactionSet;
pub use state::TransactionState;
