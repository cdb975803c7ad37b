//! Read/write cache for one table.

use crate::cache::{CommittedRows, RowOp, Transition, UncommittedRow};
use crate::config::{CacheConfig, UpdateInsertPolicy};
use crate::entity::{Entity, TableDescriptor};
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use crate::stats::CacheStats;
use crate::store::RowStore;
use crate::transaction::Transaction;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Answer of a key lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<E> {
    /// The cache holds the row.
    Row(E),
    /// The cache knows the row was deleted in this transaction.
    Deleted,
    /// The cache knows nothing; ask the row store.
    Miss,
}

impl<E> CacheLookup<E> {
    /// Returns true for [`CacheLookup::Miss`].
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Write-back cache for the rows of one table.
///
/// Owns the pending entries of the open transaction and the committed
/// images from earlier ones. Every operation requires an active
/// transaction.
///
/// Pending entries are kept ordered by key, so flushing is deterministic.
#[derive(Debug)]
pub struct ReadWriteCache<E> {
    table: TableDescriptor,
    txn: Transaction,
    policy: UpdateInsertPolicy,
    retain_selected: bool,
    pending: BTreeMap<CacheKey, UncommittedRow<E>>,
    committed: CommittedRows<E>,
    stats: Arc<CacheStats>,
}

impl<E> ReadWriteCache<E> {
    /// Returns the number of pending entries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<E: Entity> ReadWriteCache<E> {
    /// Creates an empty cache bound to `txn`.
    pub fn new(
        table: TableDescriptor,
        txn: Transaction,
        config: &CacheConfig,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            table,
            txn,
            policy: config.update_insert_policy,
            retain_selected: config.retain_selected_rows,
            pending: BTreeMap::new(),
            committed: CommittedRows::new(),
            stats,
        }
    }

    /// Returns the table this cache serves.
    #[must_use]
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// Looks up a row by key.
    ///
    /// Pending state takes priority over committed state.
    pub fn select(&mut self, key: &CacheKey) -> CacheResult<CacheLookup<E>> {
        self.ensure_active()?;

        let lookup = match self.pending.get(key) {
            Some(entry) => match entry.visible_row() {
                Some(row) => CacheLookup::Row(row.clone()),
                None => CacheLookup::Deleted,
            },
            None => match self.committed.get(key) {
                Some(row) => CacheLookup::Row(row.clone()),
                None => CacheLookup::Miss,
            },
        };

        let hit = !lookup.is_miss();
        self.stats.record_lookup(hit);
        trace!(table = %self.table, %key, hit, "cache select");
        Ok(lookup)
    }

    /// Reports a row the row store returned.
    ///
    /// Returns the row the caller should observe: the cached image if the
    /// cache already knows the key, `None` if it is deleted in this
    /// transaction, otherwise `row` itself, which is retained as a `Select`
    /// entry when configured.
    pub fn selected(&mut self, row: E) -> CacheResult<Option<E>> {
        self.ensure_active()?;
        self.stats.record_select();

        let Some(key) = row.cache_key() else {
            return Ok(Some(row));
        };

        if let Some(entry) = self.pending.get(&key) {
            return Ok(entry.selected(row));
        }
        if let Some(known) = self.committed.get(&key) {
            return Ok(Some(known.clone()));
        }

        if self.retain_selected {
            trace!(table = %self.table, %key, "retaining selected row");
            self.pending
                .insert(key.clone(), UncommittedRow::new(RowOp::Select, key, row.clone()));
        }
        Ok(Some(row))
    }

    /// Buffers an insert.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the key is known to hold a row.
    pub fn insert(&mut self, row: E) -> CacheResult<()> {
        self.apply(RowOp::Insert, row, UncommittedRow::insert)?;
        self.stats.record_insert();
        Ok(())
    }

    /// Buffers an update.
    pub fn update(&mut self, row: E) -> CacheResult<()> {
        self.apply(RowOp::Update, row, UncommittedRow::update)?;
        self.stats.record_update();
        Ok(())
    }

    /// Buffers a save.
    pub fn save(&mut self, row: E) -> CacheResult<()> {
        self.apply(RowOp::Save, row, UncommittedRow::save)?;
        self.stats.record_save();
        Ok(())
    }

    /// Buffers a delete.
    pub fn delete(&mut self, row: E) -> CacheResult<()> {
        self.apply(RowOp::Delete, row, UncommittedRow::delete)?;
        self.stats.record_delete();
        Ok(())
    }

    /// Records an insert the table already executed.
    ///
    /// Only identity tables insert ahead of commit, since their key is
    /// unknown until the database assigns it. The row is cached as an
    /// already-written insert.
    ///
    /// # Errors
    ///
    /// Returns `IllegalCacheOperation` for tables without an identity
    /// column: the cache owns their inserts and never expects a report.
    pub fn inserted(&mut self, row: E) -> CacheResult<()> {
        self.ensure_active()?;
        if !self.table.has_identity() {
            return Err(CacheError::illegal_cache_operation(format!(
                "table {} has no identity column; its inserts are deferred by the cache",
                self.table
            )));
        }

        let key = self.require_key(&row)?;
        let entry = UncommittedRow::new(RowOp::Insert, key.clone(), row).into_written();
        if let Some(stale) = self.pending.insert(key.clone(), entry) {
            warn!(table = %self.table, %key, op = %stale.op(), "generated key replaced a pending entry");
        }
        self.stats.record_insert();
        Ok(())
    }

    /// Issues the database effect of every pending entry not yet written.
    ///
    /// Entries stay pending with their `written` flag set, so a repeated
    /// flush issues nothing new. On a store error the flush stops; entries
    /// flushed so far keep their flag.
    ///
    /// Returns the number of effects issued.
    pub fn flush<S: RowStore<E>>(&mut self, store: &mut S) -> CacheResult<usize> {
        self.ensure_active()?;

        let mut issued = 0;
        for (key, entry) in &mut self.pending {
            match entry.write(store) {
                Ok(Some(effect)) => {
                    issued += 1;
                    self.stats.record_flush();
                    trace!(table = %self.table, %key, op = %entry.op(), rows = effect.rows_affected, "flushed");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(table = %self.table, %key, op = %entry.op(), error = %err, "flush aborted");
                    return Err(err.into());
                }
            }
        }

        debug!(table = %self.table, pending = self.pending.len(), issued, "cache flushed");
        Ok(issued)
    }

    /// Moves every pending entry into the committed store and clears the
    /// pending map.
    ///
    /// Called once the commit that made the entries durable succeeded.
    /// Returns the number of entries promoted.
    pub fn promote(&mut self) -> usize {
        let pending = mem::take(&mut self.pending);
        let count = pending.len();
        for entry in pending.into_values() {
            entry.update_committed(&mut self.committed);
            self.stats.record_promotion();
        }
        debug!(table = %self.table, promoted = count, committed = self.committed.len(), "cache promoted");
        count
    }

    /// Drops every pending entry without touching the database.
    ///
    /// Returns the number of entries discarded.
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.stats.record_discards(count as u64);
        debug!(table = %self.table, discarded = count, "cache discarded");
        count
    }

    /// Drops the committed image of `key`.
    ///
    /// A pending entry for the key is left alone. Returns true if an image
    /// was held.
    pub fn evict(&mut self, key: &CacheKey) -> bool {
        let evicted = self.committed.remove(key).is_some();
        if evicted {
            self.stats.record_evictions(1);
            debug!(table = %self.table, %key, "evicted");
        }
        evicted
    }

    /// Drops every committed image. Returns how many were held.
    pub fn evict_all(&mut self) -> usize {
        let count = self.committed.clear();
        self.stats.record_evictions(count as u64);
        debug!(table = %self.table, evicted = count, "evicted all");
        count
    }

    /// Returns the number of committed images.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// Returns the operation pending for `key`.
    #[must_use]
    pub fn pending_op(&self, key: &CacheKey) -> Option<RowOp> {
        self.pending.get(key).map(UncommittedRow::op)
    }

    /// Returns the pending entry for `key`.
    #[must_use]
    pub fn pending_entry(&self, key: &CacheKey) -> Option<&UncommittedRow<E>> {
        self.pending.get(key)
    }

    /// Returns the committed image of `key`.
    #[must_use]
    pub fn committed_row(&self, key: &CacheKey) -> Option<&E> {
        self.committed.get(key)
    }

    /// Returns true if some pending entry still needs a database effect.
    #[must_use]
    pub fn has_unflushed(&self) -> bool {
        self.pending.values().any(UncommittedRow::needs_flush)
    }

    /// Fails with `CacheUnavailable` unless a transaction is active.
    pub fn ensure_active(&self) -> CacheResult<()> {
        if self.txn.is_active() {
            Ok(())
        } else {
            Err(CacheError::cache_unavailable(self.table.name()))
        }
    }

    fn require_key(&self, row: &E) -> CacheResult<CacheKey> {
        row.cache_key()
            .ok_or_else(|| CacheError::missing_key(self.table.name()))
    }

    fn reject(&self, key: CacheKey) -> CacheError {
        self.stats.record_rejection();
        CacheError::duplicate_key(self.table.name(), key)
    }

    /// An insert over a pending update is refused under the strict policy,
    /// and always when the committed store proves the row exists.
    fn refuses_insert_over(&self, entry: &UncommittedRow<E>) -> bool {
        entry.op() == RowOp::Update
            && (self.policy == UpdateInsertPolicy::Strict || self.committed.contains(entry.key()))
    }

    fn apply(
        &mut self,
        op: RowOp,
        row: E,
        fold: fn(UncommittedRow<E>, E) -> Transition<E>,
    ) -> CacheResult<()> {
        self.ensure_active()?;
        let key = self.require_key(&row)?;

        let transition = match self.pending.remove(&key) {
            Some(current) => {
                self.stats.record_lookup(true);
                if op == RowOp::Insert && self.refuses_insert_over(&current) {
                    Transition::Rejected(current)
                } else {
                    let from = current.op();
                    let transition = fold(current, row);
                    trace!(table = %self.table, %key, %from, %op, "transition");
                    transition
                }
            }
            None => {
                let known = self.committed.contains(&key);
                self.stats.record_lookup(known);
                if op == RowOp::Insert && known {
                    return Err(self.reject(key));
                }
                Transition::Next(UncommittedRow::new(op, key.clone(), row))
            }
        };

        match transition {
            Transition::Next(next) => {
                self.pending.insert(key, next);
                Ok(())
            }
            Transition::Cancelled => {
                self.stats.record_cancellation();
                debug!(table = %self.table, %key, "insert cancelled by delete");
                Ok(())
            }
            Transition::Rejected(current) => {
                self.pending.insert(key.clone(), current);
                Err(self.reject(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyValue;
    use crate::store::{InMemoryRowStore, StoreOp};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        name: &'static str,
    }

    impl Entity for Row {
        fn cache_key(&self) -> Option<CacheKey> {
            Some(CacheKey::single(KeyValue::Int(self.id)))
        }
    }

    fn row(id: i64, name: &'static str) -> Row {
        Row { id, name }
    }

    fn key(id: i64) -> CacheKey {
        CacheKey::single(id)
    }

    fn setup(config: CacheConfig) -> (ReadWriteCache<Row>, Transaction, InMemoryRowStore<Row>) {
        let txn = Transaction::new();
        let cache = ReadWriteCache::new(
            TableDescriptor::new("people"),
            txn.clone(),
            &config,
            Arc::new(CacheStats::new()),
        );
        (cache, txn, InMemoryRowStore::new())
    }

    fn commit(cache: &mut ReadWriteCache<Row>, txn: &Transaction, store: &mut InMemoryRowStore<Row>) {
        cache.flush(store).unwrap();
        txn.commit().unwrap();
        cache.promote();
    }

    #[test]
    fn operations_require_active_transaction() {
        let (mut cache, _txn, _store) = setup(CacheConfig::default());

        let err = cache.insert(row(1, "a")).unwrap_err();
        assert!(matches!(err, CacheError::CacheUnavailable { .. }));
        assert!(cache.update(row(1, "a")).is_err());
        assert!(cache.save(row(1, "a")).is_err());
        assert!(cache.delete(row(1, "a")).is_err());
        assert!(cache.select(&key(1)).is_err());
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn select_prefers_pending_over_committed() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "old")).unwrap();
        commit(&mut cache, &txn, &mut store);

        txn.begin().unwrap();
        assert_eq!(cache.select(&key(1)).unwrap(), CacheLookup::Row(row(1, "old")));
        cache.update(row(1, "new")).unwrap();
        assert_eq!(cache.select(&key(1)).unwrap(), CacheLookup::Row(row(1, "new")));
        cache.delete(row(1, "new")).unwrap();
        assert_eq!(cache.select(&key(1)).unwrap(), CacheLookup::Deleted);
        assert!(cache.select(&key(2)).unwrap().is_miss());
    }

    #[test]
    fn insert_then_update_flushes_one_insert() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(5, "A")).unwrap();
        cache.update(row(5, "B")).unwrap();
        commit(&mut cache, &txn, &mut store);

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, StoreOp::Insert);
        assert_eq!(calls[0].row, Some(row(5, "B")));
    }

    #[test]
    fn insert_then_delete_never_reaches_store() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.delete(row(1, "b")).unwrap();
        assert_eq!(cache.pending_len(), 0);

        commit(&mut cache, &txn, &mut store);
        assert!(store.calls().is_empty());
        assert_eq!(cache.committed_len(), 0);
    }

    #[test]
    fn updates_merge_into_one() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        store.seed(row(1, "x"));
        txn.begin().unwrap();
        cache.update(row(1, "r1")).unwrap();
        cache.update(row(1, "r2")).unwrap();
        commit(&mut cache, &txn, &mut store);

        assert_eq!(store.call_count(StoreOp::Update), 1);
        assert_eq!(store.get(&key(1)), Some(row(1, "r2")));
    }

    #[test]
    fn insert_over_committed_row_is_duplicate() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        commit(&mut cache, &txn, &mut store);

        txn.begin().unwrap();
        let err = cache.insert(row(1, "b")).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn rejected_insert_leaves_entry_untouched() {
        let (mut cache, txn, _store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.save(row(1, "a")).unwrap();

        assert!(cache.insert(row(1, "b")).unwrap_err().is_duplicate_key());
        let entry = cache.pending_entry(&key(1)).unwrap();
        assert_eq!(entry.op(), RowOp::Save);
        assert_eq!(entry.pending().row(), &row(1, "a"));
    }

    #[test]
    fn insert_over_update_follows_policy() {
        let (mut relaxed, txn, _store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        relaxed.update(row(1, "a")).unwrap();
        relaxed.insert(row(1, "b")).unwrap();
        assert_eq!(relaxed.pending_op(&key(1)), Some(RowOp::Insert));

        let (mut strict, txn, _store) =
            setup(CacheConfig::new().update_insert_policy(UpdateInsertPolicy::Strict));
        txn.begin().unwrap();
        strict.update(row(1, "a")).unwrap();
        assert!(strict.insert(row(1, "b")).unwrap_err().is_duplicate_key());
        assert_eq!(strict.pending_op(&key(1)), Some(RowOp::Update));
    }

    #[test]
    fn insert_over_update_of_committed_row_is_rejected() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        commit(&mut cache, &txn, &mut store);

        txn.begin().unwrap();
        cache.update(row(1, "b")).unwrap();
        assert!(cache.insert(row(1, "c")).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn selected_row_is_retained_and_promoted() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        assert!(cache.select(&key(7)).unwrap().is_miss());
        assert_eq!(cache.selected(row(7, "r")).unwrap(), Some(row(7, "r")));
        commit(&mut cache, &txn, &mut store);

        assert!(store.calls().is_empty());
        txn.begin().unwrap();
        assert_eq!(cache.select(&key(7)).unwrap(), CacheLookup::Row(row(7, "r")));
    }

    #[test]
    fn selected_keeps_cache_authority() {
        let (mut cache, txn, _store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.selected(row(1, "r1")).unwrap();
        assert_eq!(cache.selected(row(1, "r2")).unwrap(), Some(row(1, "r1")));

        cache.delete(row(1, "r1")).unwrap();
        assert_eq!(cache.selected(row(1, "r3")).unwrap(), None);
    }

    #[test]
    fn selected_rows_not_retained_when_disabled() {
        let (mut cache, txn, _store) = setup(CacheConfig::new().retain_selected_rows(false));
        txn.begin().unwrap();
        cache.selected(row(1, "r")).unwrap();
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn rollback_discards_pending() {
        let (mut cache, txn, store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.delete(row(2, "b")).unwrap();

        txn.rollback().unwrap();
        assert_eq!(cache.discard(), 2);
        assert_eq!(cache.committed_len(), 0);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn flush_is_idempotent() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.update(row(2, "b")).unwrap();

        assert_eq!(cache.flush(&mut store).unwrap(), 2);
        assert!(!cache.has_unflushed());
        assert_eq!(cache.flush(&mut store).unwrap(), 0);
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn partial_flush_is_resumed() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        store.seed(row(2, "b"));
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.delete(row(2, "b")).unwrap();
        store.fail_next(StoreOp::Delete);

        assert!(cache.flush(&mut store).is_err());
        assert_eq!(store.call_count(StoreOp::Insert), 1);
        assert!(cache.pending_entry(&key(1)).unwrap().is_written());
        assert!(!cache.pending_entry(&key(2)).unwrap().is_written());

        assert_eq!(cache.flush(&mut store).unwrap(), 1);
        assert_eq!(store.call_count(StoreOp::Insert), 1);
        assert_eq!(store.call_count(StoreOp::Delete), 1);
    }

    #[test]
    fn flush_after_write_then_update_issues_update() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.flush(&mut store).unwrap();
        cache.update(row(1, "b")).unwrap();
        assert_eq!(cache.pending_op(&key(1)), Some(RowOp::Update));
        commit(&mut cache, &txn, &mut store);

        let ops: Vec<StoreOp> = store.calls().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![StoreOp::Insert, StoreOp::Update]);
        assert_eq!(cache.committed_row(&key(1)), Some(&row(1, "b")));
    }

    #[test]
    fn inserted_is_illegal_without_identity() {
        let (mut cache, txn, _store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        let err = cache.inserted(row(1, "a")).unwrap_err();
        assert!(matches!(err, CacheError::IllegalCacheOperation { .. }));
    }

    #[test]
    fn eviction() {
        let (mut cache, txn, mut store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap();
        cache.insert(row(2, "b")).unwrap();
        commit(&mut cache, &txn, &mut store);

        assert!(cache.evict(&key(1)));
        assert!(!cache.evict(&key(1)));
        assert_eq!(cache.evict_all(), 1);
        assert_eq!(cache.stats.evictions(), 2);

        txn.begin().unwrap();
        assert!(cache.select(&key(2)).unwrap().is_miss());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let (mut cache, txn, _store) = setup(CacheConfig::default());
        txn.begin().unwrap();
        cache.insert(row(1, "a")).unwrap(); // miss
        cache.update(row(1, "b")).unwrap(); // hit
        cache.select(&key(1)).unwrap(); // hit
        cache.select(&key(2)).unwrap(); // miss

        let snap = cache.stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 2);
        assert_eq!(snap.inserts, 1);
        assert_eq!(snap.updates, 1);
    }
}
