//! Entities and table descriptors.

use crate::key::{CacheKey, KeyValue};
use std::fmt;

/// A row type that can pass through the cache.
///
/// Row images are handed to the cache by value; the cache keeps its own
/// copy and returns clones on reads.
pub trait Entity: Clone + fmt::Debug {
    /// Returns the row's primary key.
    ///
    /// Returns `None` while an auto-generated identity key has not yet been
    /// assigned by the database.
    fn cache_key(&self) -> Option<CacheKey>;

    /// Stores a key generated by the database into the row.
    ///
    /// Only called for tables declared with an identity column.
    fn assign_identity(&mut self, value: KeyValue) {
        let _ = value;
    }
}

/// Static description of a logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    identity: bool,
}

impl TableDescriptor {
    /// Describes a table whose primary key is supplied by the application.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: false,
        }
    }

    /// Describes a table with an auto-generated identity key.
    pub fn identity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: true,
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the table declares an identity column.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.identity
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
