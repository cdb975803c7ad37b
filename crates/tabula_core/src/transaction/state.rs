//! Transaction state.

use crate::error::{CacheError, CacheResult};
use crate::transaction::{NoopBackend, SharedListener, TransactionBackend};
use crate::types::{ListenerId, TransactionId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No unit of work is open.
    Inactive,
    /// A unit of work is open and accepts operations.
    Active,
}

struct TransactionInner {
    state: Cell<TransactionState>,
    /// ID of the open span, or of the last one once inactive.
    current: Cell<TransactionId>,
    next_listener: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, SharedListener)>>,
    backend: RefCell<Box<dyn TransactionBackend>>,
}

/// The ambient transaction of a database handle.
///
/// `Transaction` is a cheap handle; clones observe and drive the same
/// transaction. It is reusable: after a commit or rollback it can begin
/// again, and every span gets a fresh [`TransactionId`].
///
/// Not thread-safe. Each thread needs its own database handle and thus its
/// own transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Rc<TransactionInner>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Creates an inactive transaction with no physical backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Box::new(NoopBackend))
    }

    /// Creates an inactive transaction driving `backend`.
    #[must_use]
    pub fn with_backend(backend: Box<dyn TransactionBackend>) -> Self {
        Self {
            inner: Rc::new(TransactionInner {
                state: Cell::new(TransactionState::Inactive),
                current: Cell::new(TransactionId::new(0)),
                next_listener: Cell::new(1),
                listeners: RefCell::new(Vec::new()),
                backend: RefCell::new(backend),
            }),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.state.get()
    }

    /// Checks if a unit of work is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Returns the ID of the open span.
    #[must_use]
    pub fn id(&self) -> Option<TransactionId> {
        self.is_active().then(|| self.inner.current.get())
    }

    /// Registers a listener. Listeners run in registration order.
    pub fn add_listener(&self, listener: SharedListener) -> ListenerId {
        let id = ListenerId::new(self.inner.next_listener.get());
        self.inner.next_listener.set(id.as_u64() + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        debug!(%id, "transaction listener registered");
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(%id, "transaction listener removed");
        }
        removed
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Begins a unit of work.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if a unit of work is already open, or the
    /// backend's error if the physical begin fails.
    pub fn begin(&self) -> CacheResult<TransactionId> {
        if self.is_active() {
            return Err(CacheError::illegal_state("transaction already active"));
        }

        self.inner.backend.borrow_mut().begin()?;

        let id = self.inner.current.get().next();
        self.inner.current.set(id);
        self.inner.state.set(TransactionState::Active);
        debug!(txn = %id, "transaction begun");

        for listener in self.snapshot_listeners() {
            listener.borrow_mut().after_begin(id);
        }
        Ok(id)
    }

    /// Commits the unit of work.
    ///
    /// Listeners' `before_commit` hooks run first, then the physical commit,
    /// then `after_commit`. If a hook or the physical commit fails, the error
    /// is returned and the transaction stays active; the caller decides
    /// whether to retry or roll back.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no unit of work is open.
    pub fn commit(&self) -> CacheResult<()> {
        let id = self.require_active("commit")?;
        let listeners = self.snapshot_listeners();

        for listener in &listeners {
            listener.borrow_mut().before_commit(id)?;
        }

        self.inner.backend.borrow_mut().commit()?;
        self.inner.state.set(TransactionState::Inactive);
        debug!(txn = %id, "transaction committed");

        for listener in &listeners {
            listener.borrow_mut().after_commit(id);
        }
        self.release_retired();
        Ok(())
    }

    /// Rolls back the unit of work.
    ///
    /// The transaction becomes inactive and listeners are notified even if
    /// the physical rollback fails; that failure is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no unit of work is open.
    pub fn rollback(&self) -> CacheResult<()> {
        let id = self.require_active("roll back")?;

        let result = self.inner.backend.borrow_mut().rollback();
        self.inner.state.set(TransactionState::Inactive);
        debug!(txn = %id, "transaction rolled back");

        for listener in self.snapshot_listeners() {
            listener.borrow_mut().after_rollback(id);
        }
        self.release_retired();
        result.map_err(CacheError::from)
    }

    fn require_active(&self, action: &str) -> CacheResult<TransactionId> {
        self.id()
            .ok_or_else(|| CacheError::illegal_state(format!("cannot {action}: no active transaction")))
    }

    fn release_retired(&self) {
        self.inner.listeners.borrow_mut().retain(|(id, listener)| {
            let retired = listener.borrow().is_retired();
            if retired {
                debug!(%id, "retired transaction listener released");
            }
            !retired
        });
    }

    /// Listeners may register or deregister from inside a hook, so hooks run
    /// over a copy of the list.
    fn snapshot_listeners(&self) -> Vec<SharedListener> {
        self.inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state())
            .field("current", &self.inner.current.get())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
