use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use goodstock_core::{ClaimId, LocationId, OperationContext, OrderId, PackageId};
use goodstock_events::Event;

use crate::containment::ContainerRef;
use crate::ledger::{LedgerAction, LedgerEntry};

/// What an operation did to a package, carrying everything needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageChange {
    Received {
        location_id: Option<LocationId>,
        inventory_number: Option<String>,
        /// Quantity placed at `location_id` by this receipt.
        allocated: i64,
    },
    MarkedMissing,
    Moved {
        quantity: i64,
        from: LocationId,
        to: LocationId,
    },
    Designated {
        claim_id: ClaimId,
        order_id: OrderId,
        /// New total quantity of the claim.
        quantity: i64,
        shipping_number: Option<i64>,
    },
    Undesignated {
        claim_id: ClaimId,
        order_id: OrderId,
    },
    Dispatched {
        claim_id: ClaimId,
        order_id: OrderId,
        quantity: i64,
        location_id: LocationId,
    },
    Undispatched {
        claim_id: ClaimId,
        order_id: OrderId,
        quantity: i64,
        location_id: LocationId,
    },
    Packed {
        container: ContainerRef,
        quantity: i64,
        location_id: LocationId,
    },
    Unpacked {
        container: ContainerRef,
        quantity: i64,
        location_id: LocationId,
    },
    QuantityChanged {
        action: LedgerAction,
        /// Signed change in on-hand quantity.
        quantity: i64,
        location_id: LocationId,
    },
    Destroyed,
    Purged,
    ExternalLinked {
        stockit_id: i64,
    },
    ExternalUnlinked,
    SetAssigned {
        set_id: Option<PackageId>,
    },
}

impl PackageChange {
    pub fn name(&self) -> &'static str {
        match self {
            PackageChange::Received { .. } => "received",
            PackageChange::MarkedMissing => "marked_missing",
            PackageChange::Moved { .. } => "moved",
            PackageChange::Designated { .. } => "designated",
            PackageChange::Undesignated { .. } => "undesignated",
            PackageChange::Dispatched { .. } => "dispatched",
            PackageChange::Undispatched { .. } => "undispatched",
            PackageChange::Packed { .. } => "packed",
            PackageChange::Unpacked { .. } => "unpacked",
            PackageChange::QuantityChanged { .. } => "quantity_changed",
            PackageChange::Destroyed => "destroyed",
            PackageChange::Purged => "purged",
            PackageChange::ExternalLinked { .. } => "external_linked",
            PackageChange::ExternalUnlinked => "external_unlinked",
            PackageChange::SetAssigned { .. } => "set_assigned",
        }
    }
}

/// A committed change to one package plus the ledger entries it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEvent {
    pub package_id: PackageId,
    pub context: OperationContext,
    pub change: PackageChange,
    pub entries: Vec<LedgerEntry>,
}

impl Event for PackageEvent {
    fn event_type(&self) -> &'static str {
        match self.change {
            PackageChange::Received { .. } => "inventory.package.received",
            PackageChange::MarkedMissing => "inventory.package.marked_missing",
            PackageChange::Moved { .. } => "inventory.package.moved",
            PackageChange::Designated { .. } => "inventory.package.designated",
            PackageChange::Undesignated { .. } => "inventory.package.undesignated",
            PackageChange::Dispatched { .. } => "inventory.package.dispatched",
            PackageChange::Undispatched { .. } => "inventory.package.undispatched",
            PackageChange::Packed { .. } => "inventory.package.packed",
            PackageChange::Unpacked { .. } => "inventory.package.unpacked",
            PackageChange::QuantityChanged { .. } => "inventory.package.quantity_changed",
            PackageChange::Destroyed => "inventory.package.destroyed",
            PackageChange::Purged => "inventory.package.purged",
            PackageChange::ExternalLinked { .. } => "inventory.package.external_linked",
            PackageChange::ExternalUnlinked => "inventory.package.external_unlinked",
            PackageChange::SetAssigned { .. } => "inventory.package.set_assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.context.occurred_at
    }
}
