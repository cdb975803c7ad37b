//! Table-level operations.

use crate::cache::{CacheLookup, ReadWriteCache, RowOp};
use crate::entity::{Entity, TableDescriptor};
use crate::error::CacheResult;
use crate::key::CacheKey;
use crate::store::{RowStore, SaveCoordinator};
use crate::transaction::{SharedListener, Transaction, TransactionListener};
use crate::types::{ListenerId, TransactionId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// State shared between a table handle and the transaction it listens to.
struct TableShared<E, S> {
    descriptor: TableDescriptor,
    store: S,
    cache: Option<ReadWriteCache<E>>,
    /// Set when the table handle was dropped with writes still pending.
    retired: bool,
}

impl<E: Entity, S: RowStore<E>> TransactionListener for TableShared<E, S> {
    fn before_commit(&mut self, txn: TransactionId) -> CacheResult<()> {
        if let Some(cache) = &mut self.cache {
            debug!(table = %self.descriptor, %txn, "flushing before commit");
            cache.flush(&mut self.store)?;
        }
        Ok(())
    }

    fn after_commit(&mut self, _txn: TransactionId) {
        if let Some(cache) = &mut self.cache {
            cache.promote();
        }
    }

    fn after_rollback(&mut self, _txn: TransactionId) {
        if let Some(cache) = &mut self.cache {
            cache.discard();
        }
    }

    fn is_retired(&self) -> bool {
        self.retired
    }
}

impl<E: Entity, S: RowStore<E>> TableShared<E, S> {
    /// Inserts right away and reports the generated key to the cache.
    fn insert_identity(&mut self, mut row: E) -> CacheResult<E> {
        if let Some(cache) = &self.cache {
            cache.ensure_active()?;
        }

        let effect = self.store.insert(&row)?;
        if let Some(key) = effect.generated_key {
            row.assign_identity(key);
        }

        if let Some(cache) = &mut self.cache {
            cache.inserted(row.clone())?;
        }
        Ok(row)
    }
}

/// A logical table backed by a row store.
///
/// For tables in the cached set, reads and writes go through a
/// [`ReadWriteCache`]: writes are buffered until the transaction commits and
/// reads are answered from cache state when possible. Other tables write
/// through to the row store.
///
/// Dropping the table deregisters it from the transaction. If it still has
/// pending writes inside an open transaction, it stays registered until that
/// transaction commits or rolls back.
pub struct Table<E, S> {
    shared: Rc<RefCell<TableShared<E, S>>>,
    txn: Transaction,
    listener: Option<ListenerId>,
}

impl<E, S> Table<E, S>
where
    E: Entity + 'static,
    S: RowStore<E> + 'static,
{
    /// Creates a table; a cache is attached when `cache` is given.
    pub(crate) fn new(
        descriptor: TableDescriptor,
        store: S,
        txn: Transaction,
        cache: Option<ReadWriteCache<E>>,
    ) -> Self {
        let cached = cache.is_some();
        let shared = Rc::new(RefCell::new(TableShared {
            descriptor,
            store,
            cache,
            retired: false,
        }));

        let listener = cached.then(|| {
            let as_listener: SharedListener = shared.clone();
            txn.add_listener(as_listener)
        });

        Self {
            shared,
            txn,
            listener,
        }
    }
}

impl<E: Entity, S: RowStore<E>> Table<E, S> {
    /// Returns the table's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> TableDescriptor {
        self.shared.borrow().descriptor.clone()
    }

    /// Returns true if calls go through the cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.shared.borrow().cache.is_some()
    }

    /// Reads a row by primary key.
    ///
    /// Cached tables answer from pending or committed state first and only
    /// ask the row store on a miss.
    pub fn select(&mut self, key: &CacheKey) -> CacheResult<Option<E>> {
        let mut shared = self.shared.borrow_mut();
        let TableShared { store, cache, .. } = &mut *shared;

        let Some(cache) = cache else {
            return Ok(store.select_by_key(key)?);
        };

        match cache.select(key)? {
            CacheLookup::Row(row) => Ok(Some(row)),
            CacheLookup::Deleted => Ok(None),
            CacheLookup::Miss => match store.select_by_key(key)? {
                Some(row) => cache.selected(row),
                None => Ok(None),
            },
        }
    }

    /// Reads every row matching `predicate`.
    ///
    /// The row store cannot see buffered writes, so cached tables flush
    /// them first. Returned rows pass through the cache, which keeps
    /// authority over rows it already holds.
    pub fn select_where<P>(&mut self, predicate: P) -> CacheResult<Vec<E>>
    where
        P: Fn(&E) -> bool,
    {
        let mut shared = self.shared.borrow_mut();
        let TableShared { store, cache, .. } = &mut *shared;

        let Some(cache) = cache else {
            return Ok(store.select_where(&predicate)?);
        };

        cache.flush(store)?;
        let rows = store.select_where(&predicate)?;

        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(row) = cache.selected(row)? {
                visible.push(row);
            }
        }
        Ok(visible)
    }

    /// Inserts a row and returns it.
    ///
    /// On identity tables a row without a key is inserted immediately so
    /// the database can assign the key; the returned row carries it.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the cache knows the key already exists.
    pub fn insert(&mut self, row: E) -> CacheResult<E> {
        let mut shared = self.shared.borrow_mut();
        if shared.descriptor.has_identity() && row.cache_key().is_none() {
            return shared.insert_identity(row);
        }

        let TableShared { store, cache, .. } = &mut *shared;
        match cache {
            Some(cache) => cache.insert(row.clone())?,
            None => {
                store.insert(&row)?;
            }
        }
        Ok(row)
    }

    /// Updates a row.
    pub fn update(&mut self, row: E) -> CacheResult<()> {
        let mut shared = self.shared.borrow_mut();
        let TableShared { store, cache, .. } = &mut *shared;
        match cache {
            Some(cache) => cache.update(row),
            None => {
                store.update(&row)?;
                Ok(())
            }
        }
    }

    /// Updates a row, or inserts it if absent. Returns the saved row.
    pub fn save(&mut self, row: E) -> CacheResult<E> {
        let mut shared = self.shared.borrow_mut();
        if shared.descriptor.has_identity() && row.cache_key().is_none() {
            return shared.insert_identity(row);
        }

        let TableShared { store, cache, .. } = &mut *shared;
        match cache {
            Some(cache) => cache.save(row.clone())?,
            None => {
                SaveCoordinator::new(store).save(&row)?;
            }
        }
        Ok(row)
    }

    /// Deletes a row.
    pub fn delete(&mut self, row: E) -> CacheResult<()> {
        let mut shared = self.shared.borrow_mut();
        let TableShared { store, cache, .. } = &mut *shared;
        match cache {
            Some(cache) => cache.delete(row),
            None => {
                store.delete(&row)?;
                Ok(())
            }
        }
    }

    /// Writes all buffered effects to the row store without committing.
    ///
    /// Returns the number of effects issued.
    pub fn flush(&mut self) -> CacheResult<usize> {
        let mut shared = self.shared.borrow_mut();
        let TableShared { store, cache, .. } = &mut *shared;
        match cache {
            Some(cache) => cache.flush(store),
            None => Ok(0),
        }
    }

    /// Drops the committed image of `key`.
    pub fn evict(&mut self, key: &CacheKey) -> bool {
        self.with_cache(|cache| cache.evict(key)).unwrap_or(false)
    }

    /// Drops every committed image.
    pub fn evict_all(&mut self) -> usize {
        self.with_cache(ReadWriteCache::evict_all).unwrap_or(0)
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared
            .borrow()
            .cache
            .as_ref()
            .map_or(0, ReadWriteCache::pending_len)
    }

    /// Returns the number of committed images.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.shared
            .borrow()
            .cache
            .as_ref()
            .map_or(0, ReadWriteCache::committed_len)
    }

    /// Returns the operation pending for `key`.
    #[must_use]
    pub fn pending_op(&self, key: &CacheKey) -> Option<RowOp> {
        self.shared
            .borrow()
            .cache
            .as_ref()
            .and_then(|cache| cache.pending_op(key))
    }

    /// Returns the committed image of `key`.
    #[must_use]
    pub fn committed_row(&self, key: &CacheKey) -> Option<E> {
        self.shared
            .borrow()
            .cache
            .as_ref()
            .and_then(|cache| cache.committed_row(key).cloned())
    }

    fn with_cache<R>(&mut self, f: impl FnOnce(&mut ReadWriteCache<E>) -> R) -> Option<R> {
        self.shared.borrow_mut().cache.as_mut().map(f)
    }
}

impl<E, S> Drop for Table<E, S> {
    fn drop(&mut self) {
        let Some(id) = self.listener.take() else {
            return;
        };

        // Pending writes still belong to the open transaction.
        let mut shared = self.shared.borrow_mut();
        let pending = shared.cache.as_ref().map_or(0, ReadWriteCache::pending_len);
        if pending > 0 && self.txn.is_active() {
            debug!(table = %shared.descriptor, pending, "table dropped inside a transaction, kept until it ends");
            shared.retired = true;
            return;
        }
        drop(shared);
        self.txn.remove_listener(id);
    }
}

impl<E, S> std::fmt::Debug for Table<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Table")
            .field("table", &shared.descriptor.name())
            .field("cached", &shared.cache.is_some())
            .finish_non_exhaustive()
    }
}
