use std::sync::Arc;

use tracing::{debug, warn};

use goodstock_core::PackageId;
use goodstock_inventory::PackageAggregate;

use super::payload::StockitPayload;
use super::{ExternalInventory, SyncAction, SyncError, SyncOutcome, SyncRequest, SyncResponse};
use crate::directory::{LocationDirectory, OrderDirectory};

/// Decides which packages are mirrored and performs the calls.
///
/// Only inventorized, non-container packages are synced, and move/dispatch/
/// undispatch only for singletons. Everything else is skipped as a success.
pub struct SyncAdapter<E> {
    external: E,
    locations: Arc<dyn LocationDirectory>,
    orders: Arc<dyn OrderDirectory>,
    enabled: bool,
}

impl<E: ExternalInventory> SyncAdapter<E> {
    pub fn new(
        external: E,
        locations: Arc<dyn LocationDirectory>,
        orders: Arc<dyn OrderDirectory>,
        enabled: bool,
    ) -> Self {
        Self {
            external,
            locations,
            orders,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn external(&self) -> &E {
        &self.external
    }

    /// Whether `action` would produce a request for this package right now.
    pub fn applies(&self, action: SyncAction, aggregate: &PackageAggregate) -> bool {
        let package = aggregate.package();
        self.enabled
            && package.is_inventorized()
            && !package.is_container()
            && (!action.singleton_only() || package.is_singleton())
    }

    /// Create the item, or update it when a Stockit id is already cached.
    pub fn create(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Create, aggregate)
    }

    pub fn update(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Update, aggregate)
    }

    pub fn move_item(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Move, aggregate)
    }

    pub fn dispatch(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Dispatch, aggregate)
    }

    pub fn undispatch(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Undispatch, aggregate)
    }

    pub fn delete(&self, aggregate: &PackageAggregate) -> SyncOutcome {
        self.sync(SyncAction::Delete, aggregate)
    }

    /// Delete by Stockit id, for packages that no longer exist locally.
    pub fn delete_by_id(&self, package_id: PackageId, stockit_id: Option<i64>) -> SyncOutcome {
        if !self.enabled {
            return SyncOutcome::skipped();
        }
        let request = SyncRequest {
            action: SyncAction::Delete,
            body: serde_json::json!({ "id": stockit_id }),
        };
        self.finish(package_id, request)
    }

    pub fn sync(&self, action: SyncAction, aggregate: &PackageAggregate) -> SyncOutcome {
        if !self.applies(action, aggregate) {
            return SyncOutcome::skipped();
        }
        let package = aggregate.package();
        let action = match action {
            SyncAction::Create if package.stockit.stockit_id.is_some() => SyncAction::Update,
            other => other,
        };

        let body = if action == SyncAction::Delete {
            serde_json::json!({ "id": package.stockit.stockit_id })
        } else {
            let designation_id = package
                .order_id
                .and_then(|order_id| self.orders.order(order_id))
                .and_then(|order| order.stockit_id);
            let payload = StockitPayload::build(aggregate, self.locations.as_ref(), designation_id);
            match serde_json::to_value(&payload) {
                Ok(body) => body,
                Err(e) => return SyncOutcome::failed(&SyncError::Decode(e.to_string())),
            }
        };

        self.finish(package.id, SyncRequest { action, body })
    }

    /// Send a raw request. Fails with `Disabled` when sync is switched off.
    pub fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        if !self.enabled {
            return Err(SyncError::Disabled);
        }
        self.external.send(request)
    }

    fn finish(&self, package_id: PackageId, request: SyncRequest) -> SyncOutcome {
        match self.send(&request) {
            Ok(response) => {
                debug!(package_id = %package_id, action = %request.action, item_id = ?response.item_id, "stockit sync ok");
                SyncOutcome {
                    item_id: response.item_id,
                    errors: Default::default(),
                    sent: true,
                }
            }
            Err(err) => {
                warn!(package_id = %package_id, action = %request.action, error = %err, "stockit sync failed");
                SyncOutcome::failed(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryLocationDirectory, InMemoryOrderDirectory};
    use crate::sync::InMemoryExternalInventory;
    use goodstock_core::{LocationId, OperationContext, UserId};
    use goodstock_inventory::{NewPackage, PackageCommand, PackageOp, Receive, StorageType};

    fn adapter(enabled: bool) -> (SyncAdapter<Arc<InMemoryExternalInventory>>, Arc<InMemoryExternalInventory>) {
        let stockit = Arc::new(InMemoryExternalInventory::new());
        let adapter = SyncAdapter::new(
            stockit.clone(),
            Arc::new(InMemoryLocationDirectory::new()),
            Arc::new(InMemoryOrderDirectory::new()),
            enabled,
        );
        (adapter, stockit)
    }

    fn received(builder: NewPackage) -> PackageAggregate {
        let op = PackageOp::Receive(Receive {
            location_id: Some(LocationId::new()),
            inventory_number: Some("000001".into()),
        });
        PackageAggregate::new(builder.build().unwrap())
            .execute(&PackageCommand::new(OperationContext::stock_app(UserId::new()), op))
            .unwrap()
            .0
    }

    #[test]
    fn disabled_adapter_sends_nothing() {
        let (adapter, stockit) = adapter(false);
        let outcome = adapter.create(&received(NewPackage::new("CHR", 1)));
        assert!(outcome.is_success());
        assert!(!outcome.sent);
        assert!(stockit.requests().is_empty());
        assert_eq!(adapter.send(&SyncRequest { action: SyncAction::Create, body: serde_json::json!({}) }), Err(SyncError::Disabled));
    }

    #[test]
    fn containers_and_uninventorized_packages_are_skipped() {
        let (adapter, stockit) = adapter(true);
        adapter.create(&received(NewPackage::new("BOX", 1).stored_as(StorageType::Box)));
        adapter.create(&PackageAggregate::new(NewPackage::new("CHR", 1).build().unwrap()));
        assert!(stockit.requests().is_empty());
    }

    #[test]
    fn move_is_singleton_only() {
        let (adapter, stockit) = adapter(true);
        adapter.move_item(&received(NewPackage::new("CHR", 3)));
        assert!(stockit.requests().is_empty());
        adapter.move_item(&received(NewPackage::new("CHR", 1)));
        assert_eq!(stockit.actions(), vec![SyncAction::Move]);
    }

    #[test]
    fn create_turns_into_update_once_linked() {
        let (adapter, stockit) = adapter(true);
        let agg = received(NewPackage::new("CHR", 1));
        let outcome = adapter.create(&agg);
        let item_id = outcome.item_id.unwrap();

        let op = PackageOp::LinkExternal { stockit_id: item_id };
        let (linked, _) = agg
            .execute(&PackageCommand::new(OperationContext::stock_app(UserId::new()), op))
            .unwrap();
        adapter.create(&linked);

        assert_eq!(stockit.actions(), vec![SyncAction::Create, SyncAction::Update]);
    }

    #[test]
    fn failures_surface_as_field_errors() {
        let (adapter, stockit) = adapter(true);
        stockit.fail_next(SyncError::Timeout(5000));
        let outcome = adapter.create(&received(NewPackage::new("CHR", 1)));
        assert!(!outcome.is_success());
        assert!(outcome.errors.contains_key("connection_error"));
    }
}
