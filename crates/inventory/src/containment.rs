//! Box/pallet containment, derived from pack and unpack ledger entries.
//!
//! A pack entry on a package carries `-q` with the container as its source,
//! an unpack entry `+q`. What a container holds is the negated net of those
//! entries, per contained package.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult, LocationId, PackageId};

use crate::ledger::{LedgerAction, LedgerEntry, LedgerSource, SourceFilter, quantity_delta};
use crate::location::LocationAllocations;
use crate::package::{Package, StorageType};

const PACKING: &[LedgerAction] = &[LedgerAction::Pack, LedgerAction::Unpack];

/// The container side of a pack/unpack operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: PackageId,
    pub storage_type: StorageType,
}

impl ContainerRef {
    pub fn of(container: &Package) -> Self {
        Self {
            id: container.id,
            storage_type: container.storage_type,
        }
    }

    pub fn source(&self) -> LedgerSource {
        LedgerSource::Package(self.id)
    }
}

/// Quantity of the package owning `entries` currently inside `container`.
pub fn quantity_in_container(entries: &[LedgerEntry], container: PackageId) -> i64 {
    let source = LedgerSource::Package(container);
    -quantity_delta(entries, PACKING, SourceFilter::Only(&source))
}

/// Containers holding a positive quantity of the package owning `entries`.
pub fn containers_of(entries: &[LedgerEntry]) -> BTreeSet<PackageId> {
    let mut net: BTreeMap<PackageId, i64> = BTreeMap::new();
    for entry in entries.iter().filter(|e| PACKING.contains(&e.action)) {
        if let Some(container) = entry.source.as_ref().and_then(LedgerSource::container) {
            *net.entry(container).or_default() -= entry.quantity;
        }
    }
    net.into_iter().filter(|(_, q)| *q > 0).map(|(id, _)| id).collect()
}

/// Per contained package, the net quantity inside `container`.
///
/// `entries` may span any number of packages; zero and negative nets are dropped.
pub fn contained_quantities<'a, I>(container: PackageId, entries: I) -> BTreeMap<PackageId, i64>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let source = LedgerSource::Package(container);
    let mut net: BTreeMap<PackageId, i64> = BTreeMap::new();
    for entry in entries
        .into_iter()
        .filter(|e| PACKING.contains(&e.action) && e.source.as_ref() == Some(&source))
    {
        *net.entry(entry.package_id).or_default() -= entry.quantity;
    }
    net.retain(|_, q| *q > 0);
    net
}

pub fn total_quantity_in<'a, I>(container: PackageId, entries: I) -> i64
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    contained_quantities(container, entries).values().sum()
}

/// Guard for packing `quantity` of `package` from `location_id` into `container`.
pub fn check_pack(
    package: &Package,
    locations: &LocationAllocations,
    container: &ContainerRef,
    quantity: i64,
    location_id: LocationId,
) -> DomainResult<()> {
    if !container.storage_type.is_container() {
        return Err(DomainError::invalid_operation(format!(
            "cannot pack into a {}",
            container.storage_type
        )));
    }
    if container.id == package.id {
        return Err(DomainError::invalid_operation("cannot pack a package into itself"));
    }
    if package.storage_type == StorageType::Pallet {
        return Err(DomainError::invalid_operation("pallets cannot be packed"));
    }
    if container.storage_type == StorageType::Box && package.storage_type == StorageType::Box {
        return Err(DomainError::invalid_operation("boxes can only be packed onto pallets"));
    }
    if quantity <= 0 {
        return Err(DomainError::validation("quantity", "must be greater than 0"));
    }
    let at_location = locations.quantity_at(location_id);
    let packable = at_location.min(package.quantities.available);
    if quantity > packable {
        if at_location < quantity {
            return Err(DomainError::insufficient_location(location_id, quantity, at_location));
        }
        return Err(DomainError::validation(
            "quantity",
            format!("only {packable} available to pack"),
        ));
    }
    Ok(())
}

/// Guard for unpacking `quantity` of the package owning `entries` out of `container`.
pub fn check_unpack(entries: &[LedgerEntry], container: &ContainerRef, quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity", "must be greater than 0"));
    }
    let inside = quantity_in_container(entries, container.id);
    if quantity > inside {
        return Err(DomainError::validation(
            "quantity",
            format!("only {inside} inside container {}", container.id),
        ));
    }
    Ok(())
}
