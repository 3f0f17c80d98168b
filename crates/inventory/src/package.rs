use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult, ItemId, LocationId, OrderId, PackageId, UserId};

use crate::detail::PackageDetail;
use crate::lifecycle::PackageState;
use crate::quantity::Quantities;

/// How a package is stored: a plain stock unit, or a container of other packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Package,
    Box,
    Pallet,
}

impl StorageType {
    pub fn name(self) -> &'static str {
        match self {
            StorageType::Package => "Package",
            StorageType::Box => "Box",
            StorageType::Pallet => "Pallet",
        }
    }

    /// Boxes and pallets hold other packages and are never mirrored to Stockit.
    pub fn is_container(self) -> bool {
        matches!(self, StorageType::Box | StorageType::Pallet)
    }
}

impl core::fmt::Display for StorageType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical measurements (all optional, centimetres / kilograms).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub pieces: Option<u32>,
}

/// Fields mirrored from / to the Stockit system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockitMirror {
    pub stockit_id: Option<i64>,
    pub designated_on: Option<NaiveDate>,
    pub designated_by: Option<UserId>,
    pub sent_on: Option<NaiveDate>,
    pub sent_by: Option<UserId>,
    pub moved_on: Option<NaiveDate>,
    pub moved_by: Option<UserId>,
}

/// A physical stock unit or multi-unit lot.
///
/// Counters in `quantities` are derived by the aggregator and only change
/// through [`crate::PackageAggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub item_id: Option<ItemId>,
    pub package_type_code: String,
    pub stockit_code_id: Option<i64>,
    pub storage_type: StorageType,
    pub donor_condition: Option<String>,
    pub grade: String,
    pub notes: String,
    pub case_number: Option<String>,
    pub dimensions: Dimensions,
    pub inventory_number: Option<String>,
    pub received_quantity: i64,
    pub quantities: Quantities,
    pub state: PackageState,
    pub received_at: Option<DateTime<Utc>>,
    pub allow_web_publish: bool,
    /// Last location the package was received into or moved to.
    pub location_id: Option<LocationId>,
    /// Distinguished member of the package set this package belongs to.
    pub package_set_id: Option<PackageId>,
    pub box_id: Option<PackageId>,
    pub pallet_id: Option<PackageId>,
    /// Order of the current designation, if any.
    pub order_id: Option<OrderId>,
    pub stockit: StockitMirror,
    pub detail: Option<PackageDetail>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Package {
    pub fn is_singleton(&self) -> bool {
        self.received_quantity == 1
    }

    pub fn is_container(&self) -> bool {
        self.storage_type.is_container()
    }

    /// Inventorized packages carry a non-blank inventory number.
    pub fn is_inventorized(&self) -> bool {
        self.inventory_number
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_dispatched(&self) -> bool {
        self.stockit.sent_on.is_some()
    }

    /// Container reference matching a storage type (`box_id` or `pallet_id`).
    pub fn parent_container(&self) -> Option<PackageId> {
        self.box_id.or(self.pallet_id)
    }

    pub fn clear_parent_containers(&mut self) {
        self.box_id = None;
        self.pallet_id = None;
    }
}

/// Input for registering a new package (donated or created in the stock app).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPackage {
    pub id: PackageId,
    pub item_id: Option<ItemId>,
    pub package_type_code: String,
    pub stockit_code_id: Option<i64>,
    pub storage_type: StorageType,
    pub donor_condition: Option<String>,
    pub grade: Option<String>,
    pub notes: String,
    pub case_number: Option<String>,
    pub dimensions: Dimensions,
    pub inventory_number: Option<String>,
    pub received_quantity: i64,
    pub detail: Option<PackageDetail>,
}

impl NewPackage {
    pub fn new(package_type_code: impl Into<String>, received_quantity: i64) -> Self {
        Self {
            id: PackageId::new(),
            item_id: None,
            package_type_code: package_type_code.into(),
            stockit_code_id: None,
            storage_type: StorageType::Package,
            donor_condition: None,
            grade: None,
            notes: String::new(),
            case_number: None,
            dimensions: Dimensions::default(),
            inventory_number: None,
            received_quantity,
            detail: None,
        }
    }

    pub fn for_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn stored_as(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.donor_condition = Some(condition.into());
        self
    }

    pub fn with_detail(mut self, detail: PackageDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Validate and build the package in the `expecting` state.
    pub fn build(self) -> DomainResult<Package> {
        if self.package_type_code.trim().is_empty() {
            return Err(DomainError::missing_field("package_type_id"));
        }
        if self.received_quantity <= 0 {
            return Err(DomainError::validation(
                "received_quantity",
                "must be greater than 0",
            ));
        }
        if self.storage_type.is_container() && self.received_quantity != 1 {
            return Err(DomainError::validation(
                "received_quantity",
                "boxes and pallets are single units",
            ));
        }

        Ok(Package {
            id: self.id,
            item_id: self.item_id,
            package_type_code: self.package_type_code,
            stockit_code_id: self.stockit_code_id,
            storage_type: self.storage_type,
            donor_condition: self.donor_condition,
            grade: self.grade.unwrap_or_else(|| "B".to_string()),
            notes: self.notes,
            case_number: self.case_number,
            dimensions: self.dimensions,
            inventory_number: self.inventory_number,
            received_quantity: self.received_quantity,
            quantities: Quantities::default(),
            state: PackageState::Expecting,
            received_at: None,
            allow_web_publish: false,
            location_id: None,
            package_set_id: None,
            box_id: None,
            pallet_id: None,
            order_id: None,
            stockit: StockitMirror::default(),
            detail: self.detail,
            deleted_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_defaults_grade_and_state() {
        let package = NewPackage::new("CHR", 5).build().unwrap();
        assert_eq!(package.grade, "B");
        assert_eq!(package.state, PackageState::Expecting);
        assert_eq!(package.quantities, Quantities::default());
        assert!(!package.is_singleton());
        assert!(!package.is_inventorized());
    }

    #[test]
    fn build_rejects_non_positive_quantity() {
        let err = NewPackage::new("CHR", 0).build().unwrap_err();
        assert_eq!(err.field(), "received_quantity");
    }

    #[test]
    fn containers_must_be_single_units() {
        let err = NewPackage::new("BOX", 3)
            .stored_as(StorageType::Box)
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let pallet = NewPackage::new("PAL", 1)
            .stored_as(StorageType::Pallet)
            .build()
            .unwrap();
        assert!(pallet.is_container());
    }

    #[test]
    fn blank_inventory_number_is_not_inventorized() {
        let mut package = NewPackage::new("CHR", 1).build().unwrap();
        package.inventory_number = Some("  ".to_string());
        assert!(!package.is_inventorized());
        package.inventory_number = Some("000123".to_string());
        assert!(package.is_inventorized());
    }
}
