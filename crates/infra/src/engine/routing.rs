//! Which Stockit call a committed change needs, and when.

use goodstock_inventory::{Package, PackageChange};

use crate::sync::SyncAction;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SyncRoute {
    /// Call Stockit before the operation returns; the result shapes the outcome.
    Inline(SyncAction),
    /// Queue a job; it runs after earlier jobs of the same package.
    Deferred(SyncAction),
    Skip,
}

pub(crate) fn route(change: &PackageChange, package: &Package) -> SyncRoute {
    let singleton_or_update = |action| {
        if package.is_singleton() {
            action
        } else {
            SyncAction::Update
        }
    };

    match change {
        PackageChange::Received { .. } => SyncRoute::Inline(SyncAction::Create),
        PackageChange::MarkedMissing => SyncRoute::Inline(SyncAction::Delete),
        PackageChange::Moved { .. } => SyncRoute::Deferred(SyncAction::Move),
        PackageChange::Dispatched { .. } => SyncRoute::Deferred(singleton_or_update(SyncAction::Dispatch)),
        PackageChange::Undispatched { .. } => SyncRoute::Deferred(singleton_or_update(SyncAction::Undispatch)),
        PackageChange::Designated { .. }
        | PackageChange::Undesignated { .. }
        | PackageChange::Packed { .. }
        | PackageChange::Unpacked { .. }
        | PackageChange::QuantityChanged { .. } => SyncRoute::Deferred(SyncAction::Update),
        // Purge queues its own delete with the Stockit id captured up front.
        PackageChange::Purged
        | PackageChange::Destroyed
        | PackageChange::ExternalLinked { .. }
        | PackageChange::ExternalUnlinked
        | PackageChange::SetAssigned { .. } => SyncRoute::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goodstock_core::{ClaimId, LocationId, OrderId};
    use goodstock_inventory::NewPackage;

    fn dispatched() -> PackageChange {
        PackageChange::Dispatched {
            claim_id: ClaimId::new(),
            order_id: OrderId::new(),
            quantity: 1,
            location_id: LocationId::new(),
        }
    }

    #[test]
    fn dispatch_of_bulk_package_is_an_update() {
        let single = NewPackage::new("CHR", 1).build().unwrap();
        let bulk = NewPackage::new("CHR", 4).build().unwrap();
        assert_eq!(route(&dispatched(), &single), SyncRoute::Deferred(SyncAction::Dispatch));
        assert_eq!(route(&dispatched(), &bulk), SyncRoute::Deferred(SyncAction::Update));
    }

    #[test]
    fn lifecycle_changes_sync_inline() {
        let package = NewPackage::new("CHR", 1).build().unwrap();
        assert_eq!(route(&PackageChange::MarkedMissing, &package), SyncRoute::Inline(SyncAction::Delete));
        assert_eq!(route(&PackageChange::Purged, &package), SyncRoute::Skip);
    }
}
