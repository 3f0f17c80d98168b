//! Per-location quantity allocations of a package (`packages_locations`).

use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult, LocationId, PackageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLocation {
    pub package_id: PackageId,
    pub location_id: LocationId,
    pub quantity: i64,
}

/// All location records of one package. Records never hold zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationAllocations {
    package_id: PackageId,
    records: Vec<PackageLocation>,
}

impl LocationAllocations {
    pub fn new(package_id: PackageId) -> Self {
        Self {
            package_id,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[PackageLocation] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn total(&self) -> i64 {
        self.records
            .iter()
            .fold(0i64, |total, r| total.saturating_add(r.quantity))
    }

    pub fn quantity_at(&self, location_id: LocationId) -> i64 {
        self.records
            .iter()
            .find(|r| r.location_id == location_id)
            .map_or(0, |r| r.quantity)
    }

    /// The only location holding the package, if there is exactly one.
    pub fn sole_location(&self) -> Option<LocationId> {
        match self.records.as_slice() {
            [only] => Some(only.location_id),
            _ => None,
        }
    }

    pub fn allocate(&mut self, location_id: LocationId, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        match self.records.iter_mut().find(|r| r.location_id == location_id) {
            Some(record) => {
                record.quantity = record
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| DomainError::validation("quantity", "is too large"))?;
            }
            None => self.records.push(PackageLocation {
                package_id: self.package_id,
                location_id,
                quantity,
            }),
        }
        Ok(())
    }

    pub fn deallocate(&mut self, location_id: LocationId, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        let held = self.quantity_at(location_id);
        if held < quantity {
            return Err(DomainError::insufficient_location(location_id, quantity, held));
        }
        for record in self.records.iter_mut().filter(|r| r.location_id == location_id) {
            record.quantity -= quantity;
        }
        self.records.retain(|r| r.quantity > 0);
        Ok(())
    }

    /// Move `quantity` between locations. Fails before touching any record.
    pub fn move_quantity(&mut self, quantity: i64, from: LocationId, to: LocationId) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        let held = self.quantity_at(from);
        if held < quantity {
            return Err(DomainError::insufficient_location(from, quantity, held));
        }
        if from == to {
            return Ok(());
        }
        self.deallocate(from, quantity)?;
        self.allocate(to, quantity)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
