//! Save (upsert) composed from update and insert.

use crate::entity::Entity;
use crate::error::StoreResult;
use crate::store::{Effect, RowStore};
use tracing::trace;

/// Runs a save against a row store as "update, else insert".
///
/// Holds the store for the duration of one save and drives its update and
/// insert paths directly.
pub struct SaveCoordinator<'a, S> {
    store: &'a mut S,
}

impl<'a, S> SaveCoordinator<'a, S> {
    /// Wraps a row store.
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Saves a row.
    ///
    /// A row without a key (identity not yet assigned) can only be inserted.
    pub fn save<E>(&mut self, row: &E) -> StoreResult<Effect>
    where
        E: Entity,
        S: RowStore<E>,
    {
        if row.cache_key().is_none() {
            return self.store.insert(row);
        }

        let effect = self.store.update(row)?;
        if !effect.is_noop() {
            return Ok(effect);
        }

        trace!(?row, "save found no row to update, inserting");
        self.store.insert(row)
    }
}
