//! # Tabula Testkit
//!
//! Test utilities for Tabula.
//!
//! This crate provides:
//! - Test entities and table fixtures
//! - A journaling row store and transaction backend for ordering checks
//! - Property-based test generators using proptest
//! - A write-through reference model to compare cached runs against
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabula_testkit::prelude::*;
//!
//! #[test]
//! fn insert_then_update() {
//!     let mut t = TestTable::cached();
//!     t.db.begin().unwrap();
//!     t.table.insert(Person::new(5, "A")).unwrap();
//!     t.table.update(Person::new(5, "B")).unwrap();
//!     t.db.commit().unwrap();
//!     assert_eq!(t.store.call_count(StoreOp::Insert), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use tabula_core::{CacheKey, RowStore, StoreOp};
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
