use std::sync::Arc;

use thiserror::Error;

use goodstock_core::{ExpectedVersion, ItemId, PackageId};
use goodstock_inventory::{LedgerEntry, LedgerSource, Package, PackageAggregate};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("package already exists: {0}")]
    AlreadyExists(PackageId),

    #[error("package not found: {0}")]
    NotFound(PackageId),

    /// The commit would rewrite history (ledger entries are append-only).
    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Versioned storage of package aggregates.
///
/// Implementations must:
/// - reject a commit whose expected version does not match the stored one
/// - treat the ledger as append-only (a commit may only add entries)
/// - write the ledger and the rest of the record atomically
pub trait PackageStore: Send + Sync {
    /// Store a new package at its current version.
    fn insert(&self, aggregate: PackageAggregate) -> Result<(), StoreError>;

    fn load(&self, package_id: PackageId) -> Result<Option<PackageAggregate>, StoreError>;

    /// Replace the stored record with `aggregate` if the stored version matches `expected`.
    fn commit(&self, aggregate: PackageAggregate, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Hard-delete a package record.
    fn remove(&self, package_id: PackageId, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Every stored package of an item.
    fn packages_for_item(&self, item_id: ItemId) -> Result<Vec<Package>, StoreError>;

    /// Ledger entries across all packages with the given source (container contents).
    fn entries_from_source(&self, source: &LedgerSource) -> Result<Vec<LedgerEntry>, StoreError>;
}

impl<S> PackageStore for Arc<S>
where
    S: PackageStore + ?Sized,
{
    fn insert(&self, aggregate: PackageAggregate) -> Result<(), StoreError> {
        (**self).insert(aggregate)
    }

    fn load(&self, package_id: PackageId) -> Result<Option<PackageAggregate>, StoreError> {
        (**self).load(package_id)
    }

    fn commit(&self, aggregate: PackageAggregate, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).commit(aggregate, expected)
    }

    fn remove(&self, package_id: PackageId, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).remove(package_id, expected)
    }

    fn packages_for_item(&self, item_id: ItemId) -> Result<Vec<Package>, StoreError> {
        (**self).packages_for_item(item_id)
    }

    fn entries_from_source(&self, source: &LedgerSource) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_from_source(source)
    }
}
