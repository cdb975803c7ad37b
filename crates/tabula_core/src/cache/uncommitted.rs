//! Per-key pending operation state machine.
//!
//! Every key touched inside a transaction has at most one
//! [`UncommittedRow`]. Each later call against the same key runs one of the
//! transition functions below, which fold the call into the existing entry:
//!
//! | Current          | insert     | update       | save         | delete       |
//! |------------------|------------|--------------|--------------|--------------|
//! | Select           | reject     | Update       | Save         | Delete       |
//! | Insert (pending) | reject     | Insert       | Insert       | cancel       |
//! | Insert (written) | reject     | Update       | Update       | Delete       |
//! | Update           | Insert     | Update       | Save         | Delete       |
//! | Save (pending)   | reject     | Save         | Save         | Delete       |
//! | Save (written)   | reject     | Update       | Update       | Delete       |
//! | Delete           | Save       | Delete (=)   | Save         | Delete (=)   |
//!
//! Entries hold the newest row image except where marked `(=)`, which keep
//! the existing entry untouched.

use crate::cache::CommittedRows;
use crate::entity::Entity;
use crate::error::StoreResult;
use crate::key::CacheKey;
use crate::store::{Effect, RowStore, SaveCoordinator};
use serde::Serialize;
use std::fmt;

/// Tag of a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOp {
    /// Row was read; no database effect.
    Select,
    /// Row will be inserted.
    Insert,
    /// Row will be updated.
    Update,
    /// Row will be updated, or inserted if absent.
    Save,
    /// Row will be deleted.
    Delete,
}

impl fmt::Display for RowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Save => "save",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// State carried by every pending entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow<E> {
    key: CacheKey,
    row: E,
    written: bool,
}

impl<E> PendingRow<E> {
    /// Returns the entry's key.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the current row image.
    #[must_use]
    pub fn row(&self) -> &E {
        &self.row
    }

    /// Returns true if the database effect already ran in this transaction.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Takes a newer image, which has not been written yet.
    fn replace(self, row: E) -> Self {
        Self {
            key: self.key,
            row,
            written: false,
        }
    }
}

/// Result of folding a call into a pending entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<E> {
    /// The entry to keep under the key.
    Next(UncommittedRow<E>),
    /// The entry must be removed; the calls cancel out.
    Cancelled,
    /// The call conflicts with the entry, which is handed back unchanged.
    Rejected(UncommittedRow<E>),
}

/// A buffered, not yet committed operation on one key.
#[derive(Debug, Clone, PartialEq)]
pub enum UncommittedRow<E> {
    /// Row was read from the database.
    Select(PendingRow<E>),
    /// Row is new.
    Insert(PendingRow<E>),
    /// Row replaces an existing one.
    Update(PendingRow<E>),
    /// Row replaces an existing one or is new.
    Save(PendingRow<E>),
    /// Row is removed.
    Delete(PendingRow<E>),
}

impl<E> UncommittedRow<E> {
    /// Creates an entry that has not been written.
    pub fn new(op: RowOp, key: CacheKey, row: E) -> Self {
        let pending = PendingRow {
            key,
            row,
            written: false,
        };
        match op {
            RowOp::Select => Self::Select(pending),
            RowOp::Insert => Self::Insert(pending),
            RowOp::Update => Self::Update(pending),
            RowOp::Save => Self::Save(pending),
            RowOp::Delete => Self::Delete(pending),
        }
    }

    /// Marks the entry as already written to the database.
    #[must_use]
    pub fn into_written(mut self) -> Self {
        self.pending_mut().written = true;
        self
    }

    /// Returns the operation tag.
    #[must_use]
    pub fn op(&self) -> RowOp {
        match self {
            Self::Select(_) => RowOp::Select,
            Self::Insert(_) => RowOp::Insert,
            Self::Update(_) => RowOp::Update,
            Self::Save(_) => RowOp::Save,
            Self::Delete(_) => RowOp::Delete,
        }
    }

    /// Returns the shared entry state.
    #[must_use]
    pub fn pending(&self) -> &PendingRow<E> {
        match self {
            Self::Select(p) | Self::Insert(p) | Self::Update(p) | Self::Save(p) | Self::Delete(p) => {
                p
            }
        }
    }

    fn pending_mut(&mut self) -> &mut PendingRow<E> {
        match self {
            Self::Select(p) | Self::Insert(p) | Self::Update(p) | Self::Save(p) | Self::Delete(p) => {
                p
            }
        }
    }

    /// Returns the entry's key.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.pending().key
    }

    /// Returns true if the database effect already ran.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.pending().written
    }

    /// Returns true if flushing this entry would issue a database effect.
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        !matches!(self, Self::Select(_)) && !self.is_written()
    }

    /// Returns the row a read should observe, or `None` if it is deleted.
    #[must_use]
    pub fn visible_row(&self) -> Option<&E> {
        match self {
            Self::Delete(_) => None,
            other => Some(&other.pending().row),
        }
    }

    /// Folds an insert into the entry.
    pub fn insert(self, row: E) -> Transition<E> {
        match self {
            // The earlier update is assumed to have matched nothing.
            Self::Update(p) => Transition::Next(Self::Insert(p.replace(row))),
            Self::Delete(p) => Transition::Next(Self::Save(p.replace(row))),
            current @ (Self::Select(_) | Self::Insert(_) | Self::Save(_)) => {
                Transition::Rejected(current)
            }
        }
    }

    /// Folds an update into the entry.
    pub fn update(self, row: E) -> Transition<E> {
        let next = match self {
            Self::Select(p) => Self::Update(p.replace(row)),
            Self::Insert(p) if !p.written => Self::Insert(p.replace(row)),
            Self::Insert(p) => Self::Update(p.replace(row)),
            Self::Update(p) => Self::Update(p.replace(row)),
            Self::Save(p) if !p.written => Self::Save(p.replace(row)),
            Self::Save(p) => Self::Update(p.replace(row)),
            deleted @ Self::Delete(_) => deleted,
        };
        Transition::Next(next)
    }

    /// Folds a save into the entry.
    pub fn save(self, row: E) -> Transition<E> {
        let next = match self {
            Self::Select(p) => Self::Save(p.replace(row)),
            Self::Insert(p) if !p.written => Self::Insert(p.replace(row)),
            Self::Insert(p) => Self::Update(p.replace(row)),
            Self::Update(p) => Self::Save(p.replace(row)),
            Self::Save(p) if !p.written => Self::Save(p.replace(row)),
            Self::Save(p) => Self::Update(p.replace(row)),
            Self::Delete(p) => Self::Save(p.replace(row)),
        };
        Transition::Next(next)
    }

    /// Folds a delete into the entry.
    pub fn delete(self, row: E) -> Transition<E> {
        match self {
            Self::Insert(p) if !p.written => Transition::Cancelled,
            deleted @ Self::Delete(_) => Transition::Next(deleted),
            Self::Select(p) | Self::Insert(p) | Self::Update(p) | Self::Save(p) => {
                Transition::Next(Self::Delete(p.replace(row)))
            }
        }
    }
}

impl<E: Clone> UncommittedRow<E> {
    /// Answers a row that the database returned for this key.
    ///
    /// The pending entry is fresher than anything the database can see, so
    /// its image wins over `row`. Returns `None` if the entry is a delete.
    pub fn selected(&self, row: E) -> Option<E> {
        let _ = row;
        self.visible_row().cloned()
    }
}

impl<E: Entity> UncommittedRow<E> {
    /// Issues the entry's database effect unless it already ran.
    ///
    /// Returns the effect, or `None` if nothing was sent to the store.
    pub fn write<S: RowStore<E>>(&mut self, store: &mut S) -> StoreResult<Option<Effect>> {
        if !self.needs_flush() {
            return Ok(None);
        }

        let effect = match self {
            Self::Select(_) => return Ok(None),
            Self::Insert(p) => store.insert(&p.row)?,
            Self::Update(p) => store.update(&p.row)?,
            Self::Save(p) => SaveCoordinator::new(store).save(&p.row)?,
            Self::Delete(p) => store.delete(&p.row)?,
        };

        self.pending_mut().written = true;
        Ok(Some(effect))
    }

    /// Moves the entry's final state into the committed store.
    pub fn update_committed(self, committed: &mut CommittedRows<E>) {
        match self {
            Self::Delete(p) => {
                committed.remove(&p.key);
            }
            Self::Select(p) | Self::Insert(p) | Self::Update(p) | Self::Save(p) => {
                committed.put(p.key, p.row);
            }
        }
    }
}
