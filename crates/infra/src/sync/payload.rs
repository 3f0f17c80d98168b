//! The `{item, package}` body Stockit expects.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use goodstock_inventory::{ClaimState, PackageAggregate};

use crate::directory::LocationDirectory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockitItem {
    pub quantity: i64,
    pub code_id: Option<i64>,
    pub inventory_number: Option<String>,
    pub case_number: Option<String>,
    pub condition: Option<String>,
    pub grade: String,
    pub description: String,
    pub location_id: Option<i64>,
    pub id: Option<i64>,
    pub pieces: Option<u32>,
    pub designation_id: Option<i64>,
    pub designated_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockitPackage {
    pub length: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockitPayload {
    pub item: StockitItem,
    pub package: StockitPackage,
}

impl StockitPayload {
    /// Build the payload for `aggregate`. `designation_id` is the Stockit id
    /// of the order the package is currently designated to.
    pub fn build(
        aggregate: &PackageAggregate,
        locations: &dyn LocationDirectory,
        designation_id: Option<i64>,
    ) -> Self {
        let package = aggregate.package();
        let dims = &package.dimensions;
        let case_number = package
            .case_number
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Self {
            item: StockitItem {
                quantity: package.received_quantity,
                code_id: package.stockit_code_id,
                inventory_number: package.inventory_number.as_deref().map(with_stockit_prefix),
                case_number,
                condition: package.donor_condition.as_deref().and_then(map_condition).map(str::to_string),
                grade: package.grade.clone(),
                description: package.notes.clone(),
                location_id: stockit_location_id(aggregate, locations),
                id: package.stockit.stockit_id,
                pieces: dims.pieces,
                designation_id,
                designated_on: package.stockit.designated_on,
            },
            package: StockitPackage {
                length: dims.length,
                width: dims.width,
                height: dims.height,
                weight: dims.weight,
                description: package.notes.clone(),
            },
        }
    }
}

/// Stockit rejects inventory numbers starting with a digit.
pub fn with_stockit_prefix(number: &str) -> String {
    if number.starts_with(|c: char| c.is_ascii_digit()) {
        format!("X{number}")
    } else {
        number.to_string()
    }
}

pub fn map_condition(condition: &str) -> Option<&'static str> {
    match condition.trim() {
        "New" => Some("N"),
        "Lightly Used" => Some("M"),
        "Heavily Used" => Some("U"),
        "Broken" => Some("B"),
        _ => None,
    }
}

// Dispatched packages have no location records here; Stockit files them under a pseudo-location.
fn stockit_location_id(aggregate: &PackageAggregate, locations: &dyn LocationDirectory) -> Option<i64> {
    let package = aggregate.package();
    let dispatched = package.is_dispatched()
        || aggregate
            .claims()
            .iter()
            .any(|c| c.state == ClaimState::Dispatched);

    if dispatched {
        locations.dispatch_location()
    } else if aggregate.locations().len() > 1 {
        locations.multiple_location()
    } else {
        aggregate
            .locations()
            .records()
            .first()
            .and_then(|r| locations.stockit_id(r.location_id))
            .or_else(|| package.location_id.and_then(|l| locations.stockit_id(l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryLocationDirectory;
    use goodstock_core::{AggregateRoot, LocationId, OperationContext, UserId};
    use goodstock_inventory::{MoveQuantity, NewPackage, PackageCommand, PackageOp, Receive};

    fn ctx() -> OperationContext {
        OperationContext::stock_app(UserId::new())
    }

    fn received(qty: i64, location_id: LocationId) -> PackageAggregate {
        let package = NewPackage::new("CHR", qty)
            .with_condition("Lightly Used")
            .with_notes("Wooden chair")
            .build()
            .unwrap();
        let op = PackageOp::Receive(Receive {
            location_id: Some(location_id),
            inventory_number: Some("000042".into()),
        });
        PackageAggregate::new(package)
            .execute(&PackageCommand::new(ctx(), op))
            .unwrap()
            .0
    }

    #[test]
    fn prefixes_numeric_inventory_numbers() {
        assert_eq!(with_stockit_prefix("000042"), "X000042");
        assert_eq!(with_stockit_prefix("F00042"), "F00042");
    }

    #[test]
    fn maps_donor_conditions() {
        assert_eq!(map_condition("New"), Some("N"));
        assert_eq!(map_condition("Heavily Used"), Some("U"));
        assert_eq!(map_condition("Sparkling"), None);
    }

    #[test]
    fn payload_uses_single_location() {
        let locations = InMemoryLocationDirectory::new().with_pseudo_locations(1, 2);
        let shelf = locations.create(Some(77));
        let agg = received(1, shelf);

        let payload = StockitPayload::build(&agg, &locations, None);
        assert_eq!(payload.item.location_id, Some(77));
        assert_eq!(payload.item.inventory_number.as_deref(), Some("X000042"));
        assert_eq!(payload.item.condition.as_deref(), Some("M"));
        assert_eq!(payload.item.description, "Wooden chair");
        assert_eq!(payload.item.quantity, 1);
        assert_eq!(agg.version(), 1);
    }

    #[test]
    fn unknown_condition_is_left_out_of_the_payload() {
        let locations = InMemoryLocationDirectory::new();
        let shelf = locations.create(Some(77));
        let package = NewPackage::new("CHR", 1).with_condition("Sparkling").build().unwrap();
        let op = PackageOp::Receive(Receive {
            location_id: Some(shelf),
            inventory_number: Some("000043".into()),
        });
        let (agg, _) = PackageAggregate::new(package)
            .execute(&PackageCommand::new(ctx(), op))
            .unwrap();

        let payload = StockitPayload::build(&agg, &locations, None);
        assert_eq!(payload.item.condition, None);
    }

    #[test]
    fn payload_uses_multiple_pseudo_location() {
        let locations = InMemoryLocationDirectory::new().with_pseudo_locations(1, 2);
        let l1 = locations.create(Some(77));
        let l2 = locations.create(Some(78));
        let agg = received(4, l1);
        let op = PackageOp::Move(MoveQuantity {
            quantity: 1,
            from: l1,
            to: l2,
        });
        let (agg, _) = agg.execute(&PackageCommand::new(ctx(), op)).unwrap();

        let payload = StockitPayload::build(&agg, &locations, None);
        assert_eq!(payload.item.location_id, Some(2));
    }
}
