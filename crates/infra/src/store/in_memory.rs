use std::collections::HashMap;
use std::sync::RwLock;

use goodstock_core::{AggregateRoot, ExpectedVersion, ItemId, PackageId};
use goodstock_inventory::{LedgerEntry, LedgerSource, Package, PackageAggregate};

use super::r#trait::{PackageStore, StoreError};

/// In-memory package store.
///
/// Intended for tests/dev. A single lock guards all records, so a commit
/// (ledger plus record) is atomic with respect to every reader.
#[derive(Debug, Default)]
pub struct InMemoryPackageStore {
    packages: RwLock<HashMap<PackageId, PackageAggregate>>,
}

impl InMemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl PackageStore for InMemoryPackageStore {
    fn insert(&self, aggregate: PackageAggregate) -> Result<(), StoreError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        let id = *aggregate.id();
        if packages.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        packages.insert(id, aggregate);
        Ok(())
    }

    fn load(&self, package_id: PackageId) -> Result<Option<PackageAggregate>, StoreError> {
        let packages = self.packages.read().map_err(poisoned)?;
        Ok(packages.get(&package_id).cloned())
    }

    fn commit(&self, aggregate: PackageAggregate, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        let id = *aggregate.id();
        let stored = packages.get(&id).ok_or(StoreError::NotFound(id))?;

        if !expected.matches(stored.version()) {
            return Err(StoreError::Concurrency(format!(
                "package {id}: expected {expected:?}, found {}",
                stored.version()
            )));
        }
        if aggregate.version() <= stored.version() {
            return Err(StoreError::InvalidCommit(format!(
                "package {id}: version must advance past {}",
                stored.version()
            )));
        }
        let old = stored.ledger().entries();
        let new = aggregate.ledger().entries();
        if new.len() < old.len() || new[..old.len()] != *old {
            return Err(StoreError::InvalidCommit(format!(
                "package {id}: ledger entries are append-only"
            )));
        }

        packages.insert(id, aggregate);
        Ok(())
    }

    fn remove(&self, package_id: PackageId, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        let stored = packages
            .get(&package_id)
            .ok_or(StoreError::NotFound(package_id))?;
        if !expected.matches(stored.version()) {
            return Err(StoreError::Concurrency(format!(
                "package {package_id}: expected {expected:?}, found {}",
                stored.version()
            )));
        }
        packages.remove(&package_id);
        Ok(())
    }

    fn packages_for_item(&self, item_id: ItemId) -> Result<Vec<Package>, StoreError> {
        let packages = self.packages.read().map_err(poisoned)?;
        let mut found: Vec<Package> = packages
            .values()
            .map(|a| a.package())
            .filter(|p| p.item_id == Some(item_id))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.id);
        Ok(found)
    }

    fn entries_from_source(&self, source: &LedgerSource) -> Result<Vec<LedgerEntry>, StoreError> {
        let packages = self.packages.read().map_err(poisoned)?;
        Ok(packages
            .values()
            .flat_map(|a| a.ledger().entries())
            .filter(|e| e.source.as_ref() == Some(source))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goodstock_core::{LocationId, OperationContext, UserId};
    use goodstock_inventory::{NewPackage, PackageCommand, PackageOp, Receive};

    fn received_command() -> PackageCommand {
        PackageCommand::new(
            OperationContext::stock_app(UserId::new()),
            PackageOp::Receive(Receive {
                location_id: Some(LocationId::new()),
                inventory_number: Some("000001".into()),
            }),
        )
    }

    #[test]
    fn commit_requires_matching_version() {
        let store = InMemoryPackageStore::new();
        let agg = PackageAggregate::new(NewPackage::new("CHR", 2).build().unwrap());
        store.insert(agg.clone()).unwrap();

        let (next, _) = agg.execute(&received_command()).unwrap();
        store.commit(next.clone(), ExpectedVersion::Exact(0)).unwrap();

        let err = store.commit(next, ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn commit_rejects_rewritten_ledger() {
        let store = InMemoryPackageStore::new();
        let agg = PackageAggregate::new(NewPackage::new("CHR", 2).build().unwrap());
        store.insert(agg.clone()).unwrap();
        let (first, _) = agg.execute(&received_command()).unwrap();
        store.commit(first, ExpectedVersion::Exact(0)).unwrap();

        // A different receive decided from the same starting point.
        let (rival, _) = agg.execute(&received_command()).unwrap();
        let rival = PackageAggregate::from_parts(
            rival.package().clone(),
            rival.locations().clone(),
            rival.claims().to_vec(),
            rival.ledger().clone(),
            2,
        );
        let err = store.commit(rival, ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, StoreError::InvalidCommit(_)));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = InMemoryPackageStore::new();
        let agg = PackageAggregate::new(NewPackage::new("CHR", 1).build().unwrap());
        store.insert(agg.clone()).unwrap();
        assert!(matches!(store.insert(agg), Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.len(), 1);
    }
}
