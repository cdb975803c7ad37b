//! Transactional write-back row cache.
//!
//! The cache keeps two maps per table:
//! - **pending**: one [`UncommittedRow`] per key touched in the open
//!   transaction, holding the coalesced operation not yet made durable
//! - **committed**: the last known-good image of every row confirmed by a
//!   commit, answering reads across transactions
//!
//! Pending state always wins over committed state. Pending entries are
//! flushed to the row store when the transaction commits and promoted into
//! the committed map once the commit succeeded; a rollback discards them.

mod committed;
mod read_write;
mod uncommitted;

pub use committed::CommittedRows;
pub use read_write::{CacheLookup, ReadWriteCache};
pub use uncommitted::{PendingRow, RowOp, Transition, UncommittedRow};
