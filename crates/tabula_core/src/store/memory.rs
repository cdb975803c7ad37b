//! In-memory row store for testing and tooling.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::key::{CacheKey, KeyValue};
use crate::store::{Effect, RowStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Kind of row store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `select_by_key`
    SelectByKey,
    /// `select_where`
    SelectWhere,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SelectByKey => "select_by_key",
            Self::SelectWhere => "select_where",
        };
        f.write_str(name)
    }
}

/// One completed call recorded by [`InMemoryRowStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall<E> {
    /// Which operation ran.
    pub op: StoreOp,
    /// Key the call addressed, if any.
    pub key: Option<CacheKey>,
    /// Row image passed to a write.
    pub row: Option<E>,
    /// Rows touched.
    pub rows_affected: u64,
}

#[derive(Debug)]
struct MemoryInner<E> {
    rows: BTreeMap<CacheKey, E>,
    next_identity: Option<i64>,
    calls: Vec<StoreCall<E>>,
    failures: Vec<StoreOp>,
}

/// An in-memory row store.
///
/// Rows are kept ordered by key. Every completed call is appended to a call
/// log so tests can assert exactly which effects reached the "database".
///
/// The store is a cheap handle: clones share the same rows and call log, so
/// a test can keep one clone while a table owns another.
///
/// # Example
///
/// ```rust,ignore
/// let store = InMemoryRowStore::<Person>::new();
/// let mut people = db.table(TableDescriptor::new("people"), store.clone());
/// // ...
/// assert_eq!(store.call_count(StoreOp::Insert), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryRowStore<E> {
    inner: Arc<RwLock<MemoryInner<E>>>,
}

impl<E> Clone for InMemoryRowStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> Default for InMemoryRowStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> InMemoryRowStore<E> {
    /// Creates an empty store whose rows carry their own keys.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty store that generates integer identity keys from 1.
    #[must_use]
    pub fn with_identity() -> Self {
        Self::build(Some(1))
    }

    fn build(next_identity: Option<i64>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner {
                rows: BTreeMap::new(),
                next_identity,
                calls: Vec::new(),
                failures: Vec::new(),
            })),
        }
    }

    /// Places a row in the store without recording a call.
    ///
    /// Rows without a key are ignored.
    pub fn seed(&self, row: E) {
        if let Some(key) = row.cache_key() {
            self.inner.write().rows.insert(key, row);
        }
    }

    /// Returns a copy of the row stored under `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<E> {
        self.inner.read().rows.get(key).cloned()
    }

    /// Returns copies of all rows in key order.
    #[must_use]
    pub fn rows(&self) -> Vec<E> {
        self.inner.read().rows.values().cloned().collect()
    }

    /// Returns the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the call log.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall<E>> {
        self.inner.read().calls.clone()
    }

    /// Returns how many completed calls of `op` were logged.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.inner.read().calls.iter().filter(|c| c.op == op).count()
    }

    /// Returns the number of logged calls that write.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner
            .read()
            .calls
            .iter()
            .filter(|c| matches!(c.op, StoreOp::Insert | StoreOp::Update | StoreOp::Delete))
            .count()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.inner.write().calls.clear();
    }

    /// Makes the next call of `op` fail with a backend error.
    ///
    /// Useful for testing flush failures.
    pub fn fail_next(&self, op: StoreOp) {
        self.inner.write().failures.push(op);
    }

    fn take_failure(inner: &mut MemoryInner<E>, op: StoreOp) -> StoreResult<()> {
        if let Some(pos) = inner.failures.iter().position(|f| *f == op) {
            inner.failures.remove(pos);
            return Err(StoreError::backend(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn key_of(row: &E) -> StoreResult<CacheKey> {
        row.cache_key()
            .ok_or_else(|| StoreError::backend("row has no primary key"))
    }
}

impl<E: Entity> RowStore<E> for InMemoryRowStore<E> {
    fn insert(&mut self, row: &E) -> StoreResult<Effect> {
        let mut inner = self.inner.write();
        Self::take_failure(&mut inner, StoreOp::Insert)?;

        let mut stored = row.clone();
        let mut generated = None;
        if stored.cache_key().is_none() {
            if let Some(next) = inner.next_identity {
                inner.next_identity = Some(next + 1);
                stored.assign_identity(KeyValue::Int(next));
                generated = Some(KeyValue::Int(next));
            }
        }

        let key = Self::key_of(&stored)?;
        if inner.rows.contains_key(&key) {
            return Err(StoreError::DuplicateKey { key });
        }

        inner.rows.insert(key.clone(), stored.clone());
        inner.calls.push(StoreCall {
            op: StoreOp::Insert,
            key: Some(key),
            row: Some(stored),
            rows_affected: 1,
        });

        Ok(match generated {
            Some(value) => Effect::generated(value),
            None => Effect::rows(1),
        })
    }

    fn update(&mut self, row: &E) -> StoreResult<Effect> {
        let mut inner = self.inner.write();
        Self::take_failure(&mut inner, StoreOp::Update)?;

        let key = Self::key_of(row)?;
        let affected = match inner.rows.get_mut(&key) {
            Some(existing) => {
                *existing = row.clone();
                1
            }
            None => 0,
        };

        inner.calls.push(StoreCall {
            op: StoreOp::Update,
            key: Some(key),
            row: Some(row.clone()),
            rows_affected: affected,
        });
        Ok(Effect::rows(affected))
    }

    fn delete(&mut self, row: &E) -> StoreResult<Effect> {
        let mut inner = self.inner.write();
        Self::take_failure(&mut inner, StoreOp::Delete)?;

        let key = Self::key_of(row)?;
        let affected = u64::from(inner.rows.remove(&key).is_some());

        inner.calls.push(StoreCall {
            op: StoreOp::Delete,
            key: Some(key),
            row: Some(row.clone()),
            rows_affected: affected,
        });
        Ok(Effect::rows(affected))
    }

    fn select_by_key(&mut self, key: &CacheKey) -> StoreResult<Option<E>> {
        let mut inner = self.inner.write();
        Self::take_failure(&mut inner, StoreOp::SelectByKey)?;

        let found = inner.rows.get(key).cloned();
        inner.calls.push(StoreCall {
            op: StoreOp::SelectByKey,
            key: Some(key.clone()),
            row: None,
            rows_affected: u64::from(found.is_some()),
        });
        Ok(found)
    }

    fn select_where(&mut self, predicate: &dyn Fn(&E) -> bool) -> StoreResult<Vec<E>> {
        let mut inner = self.inner.write();
        Self::take_failure(&mut inner, StoreOp::SelectWhere)?;

        let found: Vec<E> = inner.rows.values().filter(|r| predicate(r)).cloned().collect();
        inner.calls.push(StoreCall {
            op: StoreOp::SelectWhere,
            key: None,
            row: None,
            rows_affected: found.len() as u64,
        });
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Option<i64>,
        value: u32,
    }

    impl Entity for Row {
        fn cache_key(&self) -> Option<CacheKey> {
            self.id.map(CacheKey::single)
        }

        fn assign_identity(&mut self, value: KeyValue) {
            if let KeyValue::Int(id) = value {
                self.id = Some(id);
            }
        }
    }

    fn row(id: i64, value: u32) -> Row {
        Row {
            id: Some(id),
            value,
        }
    }

    #[test]
    fn insert_and_select() {
        let mut store = InMemoryRowStore::new();
        store.insert(&row(1, 10)).unwrap();

        let found = store.select_by_key(&CacheKey::single(1)).unwrap();
        assert_eq!(found, Some(row(1, 10)));
        assert_eq!(store.call_count(StoreOp::Insert), 1);
        assert_eq!(store.call_count(StoreOp::SelectByKey), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = InMemoryRowStore::new();
        store.insert(&row(1, 10)).unwrap();

        let err = store.insert(&row(1, 11)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.call_count(StoreOp::Insert), 1);
    }

    #[test]
    fn update_and_delete_report_rows_affected() {
        let mut store = InMemoryRowStore::new();
        assert!(store.update(&row(1, 1)).unwrap().is_noop());

        store.seed(row(1, 1));
        assert_eq!(store.update(&row(1, 2)).unwrap().rows_affected, 1);
        assert_eq!(store.delete(&row(1, 2)).unwrap().rows_affected, 1);
        assert!(store.delete(&row(1, 2)).unwrap().is_noop());
        assert!(store.is_empty());
    }

    #[test]
    fn identity_keys_are_generated() {
        let mut store = InMemoryRowStore::with_identity();
        let first = store.insert(&Row { id: None, value: 1 }).unwrap();
        let second = store.insert(&Row { id: None, value: 2 }).unwrap();

        assert_eq!(first.generated_key, Some(KeyValue::Int(1)));
        assert_eq!(second.generated_key, Some(KeyValue::Int(2)));
        assert_eq!(store.get(&CacheKey::single(2)).unwrap().value, 2);
    }

    #[test]
    fn clones_share_state() {
        let mut store = InMemoryRowStore::new();
        let observer = store.clone();
        store.insert(&row(3, 3)).unwrap();

        assert_eq!(observer.len(), 1);
        assert_eq!(observer.calls().len(), 1);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut store = InMemoryRowStore::new();
        store.fail_next(StoreOp::Insert);

        assert!(store.insert(&row(1, 1)).is_err());
        assert!(store.insert(&row(1, 1)).is_ok());
        assert_eq!(store.call_count(StoreOp::Insert), 1);
    }

    #[test]
    fn select_where_filters() {
        let mut store = InMemoryRowStore::new();
        for i in 1..=5 {
            store.seed(row(i, i as u32 * 10));
        }

        let found = store.select_where(&|r: &Row| r.value > 25).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(store.calls().last().unwrap().rows_affected, 3);
    }
}
