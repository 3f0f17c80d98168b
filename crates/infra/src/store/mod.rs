//! Package persistence boundary.
//!
//! A package, its ledger, location allocations and order claims are stored
//! together as one record with a row version. Writes are optimistic: a commit
//! names the version it was decided against and fails if another writer got
//! there first.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryPackageStore;
pub use r#trait::{PackageStore, StoreError};
