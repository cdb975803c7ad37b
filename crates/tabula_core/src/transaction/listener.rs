//! Transaction listener and backend traits.

use crate::error::{CacheResult, StoreResult};
use crate::types::TransactionId;
use std::cell::RefCell;
use std::rc::Rc;

/// Observes the lifecycle of a [`super::Transaction`].
///
/// All hooks default to doing nothing.
pub trait TransactionListener {
    /// Called after the transaction became active.
    fn after_begin(&mut self, txn: TransactionId) {
        let _ = txn;
    }

    /// Called before the physical commit is issued.
    ///
    /// An error aborts the commit; the transaction stays active so the
    /// caller can retry the commit or roll back.
    fn before_commit(&mut self, txn: TransactionId) -> CacheResult<()> {
        let _ = txn;
        Ok(())
    }

    /// Called once the physical commit succeeded.
    fn after_commit(&mut self, txn: TransactionId) {
        let _ = txn;
    }

    /// Called after the transaction was rolled back.
    fn after_rollback(&mut self, txn: TransactionId) {
        let _ = txn;
    }

    /// Returns true once the listener has no owner left.
    ///
    /// Retired listeners are removed when the transaction ends, after their
    /// `after_commit` or `after_rollback` hook ran.
    fn is_retired(&self) -> bool {
        false
    }
}

/// A listener shared between its owner and the transaction.
pub type SharedListener = Rc<RefCell<dyn TransactionListener>>;

/// The physical transaction on the database connection.
pub trait TransactionBackend {
    /// Opens a physical transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Commits the physical transaction.
    fn commit(&mut self) -> StoreResult<()>;

    /// Rolls back the physical transaction.
    fn rollback(&mut self) -> StoreResult<()>;
}

/// Backend for stores that have no transaction of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl TransactionBackend for NoopBackend {
    fn begin(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
