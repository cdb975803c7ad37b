//! Cache statistics.
//!
//! Counters for monitoring how much work the cache absorbs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tabula_core::Database;
//!
//! let db = Database::new(config);
//! // Perform operations...
//!
//! let stats = db.stats().snapshot();
//! println!("Hits: {}", stats.hits);
//! println!("Store effects: {}", stats.flushes);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics and metrics.
///
/// All counters are atomic so a monitoring thread can read them through a
/// shared `Arc` while the owning thread keeps working. Values only grow.
#[derive(Debug, Default)]
pub struct CacheStats {
    // Lookup counters
    /// Calls answered from pending or committed state.
    hits: AtomicU64,
    /// Calls the cache had no state for.
    misses: AtomicU64,

    // Operation counters
    /// Insert calls accepted.
    inserts: AtomicU64,
    /// Update calls accepted.
    updates: AtomicU64,
    /// Save calls accepted.
    saves: AtomicU64,
    /// Delete calls accepted.
    deletes: AtomicU64,
    /// Rows reported back from the store after a read.
    selects: AtomicU64,
    /// Inserts cancelled by a later delete.
    cancellations: AtomicU64,
    /// Operations rejected as duplicate keys.
    rejections: AtomicU64,

    // Lifecycle counters
    /// Row store effects issued while flushing.
    flushes: AtomicU64,
    /// Pending entries moved into the committed store.
    promotions: AtomicU64,
    /// Pending entries thrown away on rollback.
    discards: AtomicU64,
    /// Committed entries dropped by explicit eviction.
    evictions: AtomicU64,
    /// Commits observed by cache listeners.
    commits: AtomicU64,
    /// Rollbacks observed by cache listeners.
    rollbacks: AtomicU64,
}

macro_rules! counters {
    ($($field:ident => $record:ident),* $(,)?) => {
        $(
            pub(crate) fn $record(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }

            #[doc = concat!("Returns the `", stringify!($field), "` counter.")]
            pub fn $field(&self) -> u64 {
                self.$field.load(Ordering::Relaxed)
            }
        )*
    };
}

impl CacheStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    counters! {
        hits => record_hit,
        misses => record_miss,
        inserts => record_insert,
        updates => record_update,
        saves => record_save,
        deletes => record_delete,
        selects => record_select,
        cancellations => record_cancellation,
        rejections => record_rejection,
        flushes => record_flush,
        promotions => record_promotion,
        commits => record_commit,
        rollbacks => record_rollback,
    }

    /// Records a hit or a miss.
    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.record_hit();
        } else {
            self.record_miss();
        }
    }

    /// Records several discards at once.
    pub(crate) fn record_discards(&self, count: u64) {
        self.discards.fetch_add(count, Ordering::Relaxed);
    }

    /// Records several evictions at once.
    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the `discards` counter.
    pub fn discards(&self) -> u64 {
        self.discards.load(Ordering::Relaxed)
    }

    /// Returns the `evictions` counter.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            inserts: self.inserts(),
            updates: self.updates(),
            saves: self.saves(),
            deletes: self.deletes(),
            selects: self.selects(),
            cancellations: self.cancellations(),
            rejections: self.rejections(),
            flushes: self.flushes(),
            promotions: self.promotions(),
            discards: self.discards(),
            evictions: self.evictions(),
            commits: self.commits(),
            rollbacks: self.rollbacks(),
        }
    }
}

/// A point-in-time snapshot of cache statistics.
///
/// Unlike `CacheStats`, this is a plain struct that can be serialized and
/// compared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Calls answered from cache state.
    pub hits: u64,
    /// Calls the cache had no state for.
    pub misses: u64,
    /// Insert calls accepted.
    pub inserts: u64,
    /// Update calls accepted.
    pub updates: u64,
    /// Save calls accepted.
    pub saves: u64,
    /// Delete calls accepted.
    pub deletes: u64,
    /// Rows reported back after a read.
    pub selects: u64,
    /// Inserts cancelled by a later delete.
    pub cancellations: u64,
    /// Duplicate-key rejections.
    pub rejections: u64,
    /// Row store effects issued while flushing.
    pub flushes: u64,
    /// Entries promoted into the committed store.
    pub promotions: u64,
    /// Entries discarded on rollback.
    pub discards: u64,
    /// Committed entries evicted.
    pub evictions: u64,
    /// Commits observed.
    pub commits: u64,
    /// Rollbacks observed.
    pub rollbacks: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups answered from cache state, if any were made.
    #[must_use]
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64)
        }
    }
}
