//! Database handle.

use crate::cache::ReadWriteCache;
use crate::config::CacheConfig;
use crate::entity::{Entity, TableDescriptor};
use crate::error::{CacheError, CacheResult};
use crate::stats::CacheStats;
use crate::store::RowStore;
use crate::table::Table;
use crate::transaction::{Transaction, TransactionBackend, TransactionListener};
use crate::types::TransactionId;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// The main handle of the ORM.
///
/// `Database` owns the ambient [`Transaction`], the cache configuration and
/// the cache statistics. Tables created from it share its transaction; the
/// ones in the configured cached set get a write-back cache.
///
/// # Example
///
/// ```rust,ignore
/// use tabula_core::{CacheConfig, Database, InMemoryRowStore, TableDescriptor};
///
/// let db = Database::new(CacheConfig::new().cache_table("people"));
/// let mut people = db.table(TableDescriptor::new("people"), InMemoryRowStore::new());
///
/// db.in_transaction(|| {
///     people.insert(Person::new(1, "Ada"))?;
///     Ok(())
/// })?;
/// ```
///
/// A `Database` is not safe for concurrent use; create one per thread.
pub struct Database {
    config: CacheConfig,
    txn: Transaction,
    stats: Arc<CacheStats>,
}

impl Database {
    /// Creates a database handle with no physical transaction backend.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_transaction(config, Transaction::new())
    }

    /// Creates a database handle whose transaction drives `backend`.
    #[must_use]
    pub fn with_backend(config: CacheConfig, backend: Box<dyn TransactionBackend>) -> Self {
        Self::with_transaction(config, Transaction::with_backend(backend))
    }

    fn with_transaction(config: CacheConfig, txn: Transaction) -> Self {
        let stats = Arc::new(CacheStats::new());
        txn.add_listener(Rc::new(RefCell::new(StatsRecorder {
            stats: Arc::clone(&stats),
        })));
        Self { config, txn, stats }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the shared cache statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Returns a handle to the ambient transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Opens a table backed by `store`.
    ///
    /// The table is cached if its name is in the configured cached set.
    pub fn table<E, S>(&self, descriptor: TableDescriptor, store: S) -> Table<E, S>
    where
        E: Entity + 'static,
        S: RowStore<E> + 'static,
    {
        let cache = self.config.is_cached(descriptor.name()).then(|| {
            ReadWriteCache::new(
                descriptor.clone(),
                self.txn.clone(),
                &self.config,
                Arc::clone(&self.stats),
            )
        });
        debug!(table = %descriptor, cached = cache.is_some(), "table opened");
        Table::new(descriptor, store, self.txn.clone(), cache)
    }

    /// Returns true if a transaction is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }

    /// Begins a transaction.
    pub fn begin(&self) -> CacheResult<TransactionId> {
        self.txn.begin()
    }

    /// Commits the transaction, flushing every cached table first.
    ///
    /// On failure the transaction stays active.
    pub fn commit(&self) -> CacheResult<()> {
        self.txn.commit()
    }

    /// Rolls the transaction back, discarding every buffered write.
    pub fn rollback(&self) -> CacheResult<()> {
        self.txn.rollback()
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed. If it
    /// returns `Err`, or the commit fails, the transaction is rolled back
    /// and that error returned. A failing rollback is only logged.
    pub fn in_transaction<F, T>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce() -> CacheResult<T>,
    {
        self.begin()?;

        let value = match f() {
            Ok(value) => value,
            Err(err) => {
                self.rollback_after(&err);
                return Err(err);
            }
        };

        if let Err(err) = self.commit() {
            warn!(error = %err, "commit failed, rolling back");
            self.rollback_after(&err);
            return Err(err);
        }
        Ok(value)
    }

    fn rollback_after(&self, cause: &CacheError) {
        if let Err(err) = self.rollback() {
            warn!(error = %err, %cause, "rollback failed");
        }
    }
}

/// Counts transactions that actually ended, however they were driven.
struct StatsRecorder {
    stats: Arc<CacheStats>,
}

impl TransactionListener for StatsRecorder {
    fn after_commit(&mut self, _txn: TransactionId) {
        self.stats.record_commit();
    }

    fn after_rollback(&mut self, _txn: TransactionId) {
        self.stats.record_rollback();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("txn", &self.txn)
            .finish_non_exhaustive()
    }
}
