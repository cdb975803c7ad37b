//! Error types for Tabula core.

use crate::key::CacheKey;
use std::io;
use thiserror::Error;

/// Result type for cache and table operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for row store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a row store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed the statement.
    #[error("row store failure: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The backing table already holds a row with this key.
    #[error("row store rejected duplicate key {key}")]
    DuplicateKey {
        /// The conflicting key.
        key: CacheKey,
    },

    /// I/O error talking to the backing database.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors that can occur in cache and table operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An insert targets a key the cache already knows to exist.
    #[error("duplicate key {key} in table {table}")]
    DuplicateKey {
        /// The table the insert was issued against.
        table: String,
        /// The conflicting key.
        key: CacheKey,
    },

    /// A notification contract between the table layer and the cache was broken.
    #[error("illegal cache operation: {message}")]
    IllegalCacheOperation {
        /// Description of the violated contract.
        message: String,
    },

    /// A cache operation was attempted with no active transaction.
    #[error("cache for table {table} is unavailable: no active transaction")]
    CacheUnavailable {
        /// The table whose cache was addressed.
        table: String,
    },

    /// Transaction lifecycle misuse.
    #[error("illegal transaction state: {message}")]
    IllegalState {
        /// Description of the misuse.
        message: String,
    },

    /// A row of a table without an identity column carries no primary key.
    #[error("row for table {table} has no primary key")]
    MissingKey {
        /// The table the row belongs to.
        table: String,
    },

    /// Row store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CacheError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(table: impl Into<String>, key: CacheKey) -> Self {
        Self::DuplicateKey {
            table: table.into(),
            key,
        }
    }

    /// Creates an illegal cache operation error.
    pub fn illegal_cache_operation(message: impl Into<String>) -> Self {
        Self::IllegalCacheOperation {
            message: message.into(),
        }
    }

    /// Creates a cache unavailable error.
    pub fn cache_unavailable(table: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            table: table.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a missing key error.
    pub fn missing_key(table: impl Into<String>) -> Self {
        Self::MissingKey {
            table: table.into(),
        }
    }

    /// Returns true for duplicate keys detected by the cache or by the store.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey { .. } | Self::Store(StoreError::DuplicateKey { .. })
        )
    }
}
