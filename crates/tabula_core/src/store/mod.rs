//! Row store seam.
//!
//! The cache never builds SQL. It talks to the backing database through the
//! [`RowStore`] trait, which executes insert/update/delete/select-by-key for
//! one logical table.
//!
//! ## Available Stores
//!
//! - [`InMemoryRowStore`] - For testing and tooling

mod memory;
mod row_store;
mod save;

pub use memory::{InMemoryRowStore, StoreCall, StoreOp};
pub use row_store::{Effect, RowStore};
pub use save::SaveCoordinator;
