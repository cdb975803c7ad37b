//! # Tabula Core
//!
//! Transactional write-back row cache for the Tabula ORM.
//!
//! This crate provides:
//! - Cache keys built from ordered primary-key values
//! - A per-key state machine that coalesces pending operations
//! - A committed row store that survives across transactions
//! - The read/write cache that mediates between tables and the row store
//! - Transaction lifecycle hooks that flush at commit and discard at rollback
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabula_core::{CacheConfig, Database, InMemoryRowStore, TableDescriptor};
//!
//! let mut db = Database::new(CacheConfig::new().cache_all_tables(true));
//! let store = InMemoryRowStore::<Person>::new();
//! let mut people = db.table(TableDescriptor::new("people"), store.clone());
//!
//! db.begin()?;
//! people.insert(Person::new(5, "A"))?;
//! people.update(Person::new(5, "B"))?;
//! db.commit()?; // one insert of "B" reaches the store
//! ```
//!
//! A [`Database`] and everything created from it is meant for a single
//! thread. There is no internal locking; create one instance per thread.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod config;
mod database;
mod entity;
mod error;
mod key;
mod stats;
pub mod store;
mod table;
pub mod transaction;
mod types;

pub use cache::{
    CacheLookup, CommittedRows, PendingRow, ReadWriteCache, RowOp, Transition, UncommittedRow,
};
pub use config::{CacheConfig, UpdateInsertPolicy};
pub use database::Database;
pub use entity::{Entity, TableDescriptor};
pub use error::{CacheError, CacheResult, StoreError, StoreResult};
pub use key::{CacheKey, KeyValue};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{Effect, InMemoryRowStore, RowStore, SaveCoordinator, StoreCall, StoreOp};
pub use table::Table;
pub use transaction::{
    NoopBackend, SharedListener, Transaction, TransactionBackend, TransactionListener,
    TransactionState,
};
pub use types::{ListenerId, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
