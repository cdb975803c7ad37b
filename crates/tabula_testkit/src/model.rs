//! Write-through reference model.
//!
//! Cached runs are checked against this model: after a commit the row
//! store must hold exactly what issuing every write directly would have
//! left behind, and the same writes must be refused.

use crate::fixtures::Person;
use crate::generators::Op;
use std::collections::BTreeMap;
use tabula_core::{CacheResult, InMemoryRowStore, RowStore, Table};

/// Why the model refused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Insert of a key that already exists.
    DuplicateKey,
}

/// Rows as a write-through database would hold them.
#[derive(Debug, Clone, Default)]
pub struct WriteThroughModel {
    rows: BTreeMap<i64, Person>,
}

impl WriteThroughModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model holding `rows`.
    #[must_use]
    pub fn seeded(rows: &[Person]) -> Self {
        Self {
            rows: rows.iter().map(|row| (row.id, row.clone())).collect(),
        }
    }

    /// Applies one write.
    ///
    /// Updates and deletes of missing rows are no-ops; save is an upsert.
    pub fn apply(&mut self, op: &Op) -> Result<(), Refusal> {
        match op {
            Op::Insert(row) => {
                if self.rows.contains_key(&row.id) {
                    return Err(Refusal::DuplicateKey);
                }
                self.rows.insert(row.id, row.clone());
            }
            Op::Update(row) => {
                if let Some(existing) = self.rows.get_mut(&row.id) {
                    *existing = row.clone();
                }
            }
            Op::Save(row) => {
                self.rows.insert(row.id, row.clone());
            }
            Op::Delete(row) => {
                self.rows.remove(&row.id);
            }
        }
        Ok(())
    }

    /// Returns the rows in key order.
    #[must_use]
    pub fn rows(&self) -> Vec<Person> {
        self.rows.values().cloned().collect()
    }

    /// Returns the row stored under `id`.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Person> {
        self.rows.get(&id)
    }
}

/// Issues `op` against `table`.
pub fn apply_to_table<S>(table: &mut Table<Person, S>, op: &Op) -> CacheResult<()>
where
    S: RowStore<Person>,
{
    match op {
        Op::Insert(row) => table.insert(row.clone()).map(drop),
        Op::Update(row) => table.update(row.clone()),
        Op::Save(row) => table.save(row.clone()).map(drop),
        Op::Delete(row) => table.delete(row.clone()),
    }
}

/// Returns a store preloaded with `rows` and an empty call log.
#[must_use]
pub fn seeded_store(rows: &[Person]) -> InMemoryRowStore<Person> {
    let store = InMemoryRowStore::new();
    for row in rows {
        store.seed(row.clone());
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_refuses_duplicate_insert() {
        let mut model = WriteThroughModel::new();
        model.apply(&Op::Insert(Person::new(1, "a"))).unwrap();
        assert_eq!(
            model.apply(&Op::Insert(Person::new(1, "b"))),
            Err(Refusal::DuplicateKey)
        );
        assert_eq!(model.get(1), Some(&Person::new(1, "a")));
    }

    #[test]
    fn model_update_of_missing_row_is_noop() {
        let mut model = WriteThroughModel::new();
        model.apply(&Op::Update(Person::new(1, "a"))).unwrap();
        assert!(model.rows().is_empty());
    }

    #[test]
    fn model_save_upserts() {
        let mut model = WriteThroughModel::seeded(&[Person::new(1, "a")]);
        model.apply(&Op::Save(Person::new(1, "b"))).unwrap();
        model.apply(&Op::Save(Person::new(2, "c"))).unwrap();
        assert_eq!(model.rows(), vec![Person::new(1, "b"), Person::new(2, "c")]);
    }

    #[test]
    fn seeded_store_has_no_calls() {
        let store = seeded_store(&[Person::new(1, "a")]);
        assert_eq!(store.len(), 1);
        assert!(store.calls().is_empty());
    }
}
