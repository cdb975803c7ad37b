//! Transaction lifecycle.
//!
//! A [`Transaction`] is the ambient unit of work shared by every table of a
//! database handle. It moves between two states:
//! - **Inactive → Active** on `begin()`
//! - **Active → Inactive** on a successful `commit()` or on `rollback()`
//!
//! Components that buffer work, such as the row cache, register a
//! [`TransactionListener`]. Listeners see `before_commit` while the physical
//! transaction is still open, so anything they flush lands in the same
//! database transaction.

mod listener;
mod state;

pub use listener::{NoopBackend, SharedListener, TransactionBackend, TransactionListener};
pub use state::{Transaction, TransactionState};
