//! Row store trait definition.

use crate::entity::Entity;
use crate::error::StoreResult;
use crate::key::{CacheKey, KeyValue};

/// Outcome of a row store write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Effect {
    /// Number of rows the statement touched.
    pub rows_affected: u64,
    /// Key assigned by the database for identity inserts.
    pub generated_key: Option<KeyValue>,
}

impl Effect {
    /// An effect touching `count` rows.
    #[must_use]
    pub const fn rows(count: u64) -> Self {
        Self {
            rows_affected: count,
            generated_key: None,
        }
    }

    /// A single-row insert that produced a generated key.
    #[must_use]
    pub fn generated(key: KeyValue) -> Self {
        Self {
            rows_affected: 1,
            generated_key: Some(key),
        }
    }

    /// Returns true if no row was touched.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.rows_affected == 0
    }
}

/// Executes row-level statements against the backing database.
///
/// Calls are synchronous and may block on I/O. The cache calls them from
/// inside its flush loop, so implementations must not call back into the
/// cache.
///
/// # Invariants
///
/// - `insert` fails with `StoreError::DuplicateKey` if the key exists
/// - `update` and `delete` report zero rows affected for a missing key
/// - `select_by_key` returns `None` for a missing key
pub trait RowStore<E: Entity> {
    /// Inserts a row.
    ///
    /// For identity tables the returned effect carries the generated key.
    fn insert(&mut self, row: &E) -> StoreResult<Effect>;

    /// Updates the row with the same key.
    fn update(&mut self, row: &E) -> StoreResult<Effect>;

    /// Deletes the row with the same key.
    fn delete(&mut self, row: &E) -> StoreResult<Effect>;

    /// Reads a row by primary key.
    fn select_by_key(&mut self, key: &CacheKey) -> StoreResult<Option<E>>;

    /// Reads every row matching an arbitrary predicate.
    fn select_where(&mut self, predicate: &dyn Fn(&E) -> bool) -> StoreResult<Vec<E>>;
}
