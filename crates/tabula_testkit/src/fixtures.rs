//! Test fixtures for common scenarios.

use std::cell::RefCell;
use std::rc::Rc;
use tabula_core::{
    CacheConfig, CacheKey, Database, Effect, Entity, InMemoryRowStore, KeyValue, RowStore,
    StoreResult, Table, TableDescriptor, TransactionBackend, UpdateInsertPolicy,
};

/// Name of the table holding [`Person`] rows.
pub const PEOPLE: &str = "people";

/// Name of the identity table holding [`Ticket`] rows.
pub const TICKETS: &str = "tickets";

/// A row whose primary key is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Primary key.
    pub id: i64,
    /// Payload.
    pub name: String,
}

impl Person {
    /// Creates a person.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Returns the cache key for `id`.
    #[must_use]
    pub fn key(id: i64) -> CacheKey {
        CacheKey::single(id)
    }
}

impl Entity for Person {
    fn cache_key(&self) -> Option<CacheKey> {
        Some(CacheKey::single(self.id))
    }
}

/// A row whose primary key is generated by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Generated key, absent until inserted.
    pub id: Option<i64>,
    /// Payload.
    pub title: String,
}

impl Ticket {
    /// Creates a ticket without a key.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
        }
    }

    /// Creates a ticket with a known key.
    pub fn with_id(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            title: title.into(),
        }
    }
}

impl Entity for Ticket {
    fn cache_key(&self) -> Option<CacheKey> {
        self.id.map(CacheKey::single)
    }

    fn assign_identity(&mut self, value: KeyValue) {
        if let KeyValue::Int(id) = value {
            self.id = Some(id);
        }
    }
}

/// A database with one table and a handle on the table's store.
///
/// The store handle shares state with the store inside the table, so the
/// call log and contents can be inspected while the table is in use.
pub struct TestTable<E: Entity> {
    /// The table under test.
    pub table: Table<E, InMemoryRowStore<E>>,
    /// Inspection handle on the table's store.
    pub store: InMemoryRowStore<E>,
    /// Owning database. Declared last so the table drops first.
    pub db: Database,
}

impl TestTable<Person> {
    /// A cached `people` table with default settings.
    #[must_use]
    pub fn cached() -> Self {
        Self::people(CacheConfig::new().cache_table(PEOPLE))
    }

    /// A cached `people` table under the strict update-then-insert policy.
    #[must_use]
    pub fn strict() -> Self {
        Self::people(
            CacheConfig::new()
                .cache_table(PEOPLE)
                .update_insert_policy(UpdateInsertPolicy::Strict),
        )
    }

    /// A `people` table that writes through to its store.
    #[must_use]
    pub fn uncached() -> Self {
        Self::people(CacheConfig::new())
    }

    /// A `people` table under `config`.
    #[must_use]
    pub fn people(config: CacheConfig) -> Self {
        Self::open(config, TableDescriptor::new(PEOPLE), InMemoryRowStore::new())
    }
}

impl TestTable<Ticket> {
    /// A cached identity table of tickets.
    #[must_use]
    pub fn tickets() -> Self {
        Self::open(
            CacheConfig::new().cache_table(TICKETS),
            TableDescriptor::identity(TICKETS),
            InMemoryRowStore::with_identity(),
        )
    }
}

impl<E: Entity + 'static> TestTable<E> {
    /// Opens a table over `store` in a fresh database.
    #[must_use]
    pub fn open(config: CacheConfig, descriptor: TableDescriptor, store: InMemoryRowStore<E>) -> Self {
        let db = Database::new(config);
        let table = db.table(descriptor, store.clone());
        Self { table, store, db }
    }
}

/// An ordered log shared by a [`JournalStore`] and a [`JournalBackend`].
///
/// Lets tests check that buffered writes reach the store inside the
/// physical transaction, before it commits.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Returns the position of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.borrow().iter().position(|e| e == entry)
    }
}

/// A transaction backend that records `begin`, `commit` and `rollback`.
#[derive(Debug, Clone)]
pub struct JournalBackend {
    journal: Journal,
}

impl JournalBackend {
    /// Creates a backend writing to `journal`.
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl TransactionBackend for JournalBackend {
    fn begin(&mut self) -> StoreResult<()> {
        self.journal.record("begin");
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.journal.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.journal.record("rollback");
        Ok(())
    }
}

/// A row store that records each completed write in a [`Journal`].
///
/// Entries look like `insert (5)`.
#[derive(Debug, Clone)]
pub struct JournalStore<E> {
    inner: InMemoryRowStore<E>,
    journal: Journal,
}

impl<E: Entity> JournalStore<E> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: InMemoryRowStore<E>, journal: Journal) -> Self {
        Self { inner, journal }
    }

    fn log(&self, op: &str, row: &E, effect: &Effect) {
        let key = row
            .cache_key()
            .map_or_else(|| "?".to_owned(), |key| key.to_string());
        if effect.rows_affected > 0 {
            self.journal.record(format!("{op} {key}"));
        }
    }
}

impl<E: Entity> RowStore<E> for JournalStore<E> {
    fn insert(&mut self, row: &E) -> StoreResult<Effect> {
        let effect = self.inner.insert(row)?;
        self.log("insert", row, &effect);
        Ok(effect)
    }

    fn update(&mut self, row: &E) -> StoreResult<Effect> {
        let effect = self.inner.update(row)?;
        self.log("update", row, &effect);
        Ok(effect)
    }

    fn delete(&mut self, row: &E) -> StoreResult<Effect> {
        let effect = self.inner.delete(row)?;
        self.log("delete", row, &effect);
        Ok(effect)
    }

    fn select_by_key(&mut self, key: &CacheKey) -> StoreResult<Option<E>> {
        self.inner.select_by_key(key)
    }

    fn select_where(&mut self, predicate: &dyn Fn(&E) -> bool) -> StoreResult<Vec<E>> {
        self.inner.select_where(predicate)
    }
}
