//! Integration tests for the package operation pipeline.
//!
//! Tests: operation → PackageStore → EventBus → Stockit sync (inline and queued)
//!
//! Verifies:
//! - Counters stay consistent through designate/dispatch/undispatch
//! - Rejected operations leave the stored package untouched
//! - Stockit failures are reported without rolling back local state
//! - Queued sync jobs run per package in order
//! - Concurrent writers on one package are serialized

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use goodstock_core::{
        AggregateRoot, DomainError, ExpectedVersion, ItemId, LocationId, OperationContext, OrderId, Origin, PackageId,
        UserId,
    };
    use goodstock_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
    use goodstock_inventory::ledger::quantity_delta;
    use goodstock_inventory::{
        LedgerAction, LedgerEntry, LedgerSource, NewPackage, OrderState, OrderSummary, Package, PackageAggregate,
        PackageEvent, PackageState, QuantityChange, SourceFilter, StorageType,
    };

    use crate::directory::{
        InMemoryLocationDirectory, InMemoryOrderDirectory, InventoryNumbers, SequentialInventoryNumbers,
    };
    use crate::engine::{Directories, EngineError, EngineSettings, InventoryEngine, PackRequest, PackTask};
    use crate::jobs::{InMemoryJobStore, RetryPolicy, SyncJobStore};
    use crate::store::{InMemoryPackageStore, PackageStore, StoreError};
    use crate::sync::{InMemoryExternalInventory, SyncAction, SyncAdapter, SyncError};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<PackageEvent>>>;

    struct Harness<S: PackageStore + 'static = InMemoryPackageStore> {
        engine: InventoryEngine<S, Bus, Arc<InMemoryExternalInventory>>,
        bus: Bus,
        stockit: Arc<InMemoryExternalInventory>,
        orders: Arc<InMemoryOrderDirectory>,
        locations: Arc<InMemoryLocationDirectory>,
        numbers: Arc<SequentialInventoryNumbers>,
        jobs: Arc<InMemoryJobStore>,
    }

    fn harness(sync_enabled: bool) -> Harness {
        harness_with(InMemoryPackageStore::new(), sync_enabled, 3)
    }

    fn harness_with<S: PackageStore + 'static>(store: S, sync_enabled: bool, commit_retries: u32) -> Harness<S> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let stockit = Arc::new(InMemoryExternalInventory::new());
        let orders = Arc::new(InMemoryOrderDirectory::new());
        let locations = Arc::new(InMemoryLocationDirectory::new().with_pseudo_locations(1, 2));
        let numbers = Arc::new(SequentialInventoryNumbers::new());
        let jobs = InMemoryJobStore::arc();

        let directories = Directories {
            orders: orders.clone(),
            locations: locations.clone(),
            numbers: numbers.clone(),
        };
        let sync = Arc::new(SyncAdapter::new(
            stockit.clone(),
            directories.locations.clone(),
            directories.orders.clone(),
            sync_enabled,
        ));
        let settings = EngineSettings {
            commit_retries,
            retry_policy: RetryPolicy::fixed(3, std::time::Duration::from_millis(0)),
        };
        let engine = InventoryEngine::new(
            Arc::new(store),
            bus.clone(),
            sync,
            jobs.clone() as Arc<dyn SyncJobStore>,
            directories,
            settings,
        );

        Harness {
            engine,
            bus,
            stockit,
            orders,
            locations,
            numbers,
            jobs,
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::stock_app(UserId::new())
    }

    impl<S: PackageStore + 'static> Harness<S> {
        fn shelf(&self) -> LocationId {
            self.locations.create(Some(501))
        }

        fn order(&self) -> OrderId {
            let order = OrderSummary {
                id: OrderId::new(),
                state: OrderState::Processing,
                code: "GC-00042".into(),
                stockit_id: Some(42),
            };
            let id = order.id;
            self.orders.upsert(order);
            id
        }

        fn register(&self, builder: NewPackage) -> Package {
            self.engine.register(builder.build().unwrap()).unwrap()
        }

        fn received(&self, quantity: i64, location_id: LocationId) -> Package {
            let package = self.register(NewPackage::new("CHR", quantity));
            self.engine.receive(&ctx(), package.id, Some(location_id)).unwrap().package
        }
    }

    fn assert_consistent(package: &Package) {
        let q = package.quantities;
        assert!(q.on_hand >= 0 && q.available >= 0 && q.designated >= 0 && q.dispatched >= 0);
        assert_eq!(q.available + q.designated, q.on_hand);
    }

    #[test]
    fn designate_dispatch_undispatch_walkthrough() {
        let h = harness(false);
        let shelf = h.shelf();
        let order = h.order();
        let package = h.received(5, shelf);
        assert_eq!(package.state, PackageState::Received);
        assert_eq!(package.quantities.on_hand, 5);

        let p = h.engine.designate(&ctx(), package.id, order, 3, None).unwrap().package;
        assert_eq!((p.quantities.available, p.quantities.designated), (2, 3));
        assert_eq!(p.order_id, Some(order));
        assert_consistent(&p);

        let p = h.engine.dispatch(&ctx(), package.id, order, 2, None).unwrap().package;
        assert_eq!((p.quantities.designated, p.quantities.dispatched), (1, 2));
        assert_eq!(p.quantities.on_hand, 3);
        assert_consistent(&p);

        let p = h.engine.undispatch(&ctx(), package.id, order, None, shelf).unwrap().package;
        assert_eq!((p.quantities.designated, p.quantities.dispatched), (3, 0));
        assert_eq!(p.quantities.on_hand, 5);
        assert_consistent(&p);

        let agg = h.engine.aggregate(package.id).unwrap();
        assert_eq!(agg.locations().quantity_at(shelf), 5);
        assert!(agg.locations().total() <= agg.quantities().on_hand);
    }

    #[test]
    fn undesignate_restores_available_and_entries_cancel() {
        let h = harness(false);
        let order = h.order();
        let package = h.received(4, h.shelf());

        h.engine.designate(&ctx(), package.id, order, 3, None).unwrap();
        let outcome = h.engine.undesignate(&ctx(), package.id, order).unwrap();
        assert_eq!(outcome.package.quantities.available, 4);
        assert_eq!(outcome.package.quantities.designated, 0);
        assert_eq!(outcome.package.order_id, None);
        assert_eq!(outcome.packages_inventory.len(), 1);

        let ledger = h.engine.ledger(package.id).unwrap();
        let source = LedgerSource::Order(order);
        assert_eq!(
            quantity_delta(
                &ledger,
                &[LedgerAction::Designate, LedgerAction::Undesignate],
                SourceFilter::Only(&source)
            ),
            0
        );
        assert_eq!(
            h.engine.aggregate(package.id).unwrap().claims()[0].state,
            goodstock_inventory::ClaimState::Cancelled
        );
    }

    #[test]
    fn designating_more_than_available_is_rejected() {
        let h = harness(false);
        let order = h.order();
        let package = h.received(2, h.shelf());

        let err = h.engine.designate(&ctx(), package.id, order, 3, None).unwrap_err();
        assert_eq!(err.field(), "quantity");
        assert_eq!(h.engine.aggregate(package.id).unwrap().version(), 1);
    }

    #[test]
    fn closed_orders_take_no_designations() {
        let h = harness(false);
        let package = h.received(2, h.shelf());
        let closed = OrderSummary {
            id: OrderId::new(),
            state: OrderState::Closed,
            code: "GC-00007".into(),
            stockit_id: None,
        };
        h.orders.upsert(closed.clone());

        let err = h.engine.designate(&ctx(), package.id, closed.id, 1, None).unwrap_err();
        assert!(matches!(err, EngineError::Domain(_)));

        let unknown = h.engine.designate(&ctx(), package.id, OrderId::new(), 1, None).unwrap_err();
        assert!(matches!(unknown, EngineError::NotFound { entity: "order", .. }));
    }

    #[test]
    fn pack_and_unpack_track_container_contents() {
        let h = harness(false);
        let shelf = h.shelf();
        let item = h.received(5, shelf);
        let container = h.register(NewPackage::new("BOX", 1).stored_as(StorageType::Box));

        let packed = h.engine.pack(&ctx(), container.id, item.id, 2, shelf).unwrap();
        assert_eq!(packed.package.box_id, Some(container.id));
        assert_eq!(packed.package.quantities.on_hand, 3);
        assert_eq!(
            h.engine.contained_quantities(container.id).unwrap(),
            BTreeMap::from([(item.id, 2)])
        );
        assert_eq!(h.engine.total_quantity_in(container.id).unwrap(), 2);
        assert!(h.engine.containers_of(item.id).unwrap().contains(&container.id));

        let request = PackRequest {
            container_id: container.id,
            package_id: item.id,
            quantity: 2,
            location_id: shelf,
            task: PackTask::Unpack,
        };
        let unpacked = h.engine.pack_or_unpack(&ctx(), &request).unwrap();
        assert_eq!(unpacked.package.box_id, None);
        assert_eq!(unpacked.package.quantities.on_hand, 5);
        assert!(h.engine.contained_quantities(container.id).unwrap().is_empty());
        assert!(h.engine.containers_of(item.id).unwrap().is_empty());
    }

    #[test]
    fn packed_packages_cannot_go_missing() {
        let h = harness(false);
        let shelf = h.shelf();
        let item = h.received(3, shelf);
        let pallet = h.register(NewPackage::new("PAL", 1).stored_as(StorageType::Pallet));
        h.engine.pack(&ctx(), pallet.id, item.id, 1, shelf).unwrap();

        match h.engine.mark_missing(&ctx(), item.id).unwrap_err() {
            EngineError::Domain(DomainError::InvalidOperation(_)) => {}
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
        assert_eq!(h.engine.package(item.id).unwrap().state, PackageState::Received);
    }

    #[test]
    fn moving_more_than_a_location_holds_changes_nothing() {
        let h = harness(false);
        let l1 = h.shelf();
        let l2 = h.shelf();
        let package = h.received(5, l1);
        let before = h.engine.aggregate(package.id).unwrap();

        let err = h.engine.move_quantity(&ctx(), package.id, 10, l1, l2).unwrap_err();
        match err {
            EngineError::Domain(DomainError::InsufficientLocationQuantity { requested, available, .. }) => {
                assert_eq!((requested, available), (10, 5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.engine.aggregate(package.id).unwrap(), before);

        let moved = h.engine.move_quantity(&ctx(), package.id, 5, l1, l2).unwrap();
        assert_eq!(moved.package.location_id, Some(l2));
        assert_eq!(moved.packages_inventory.len(), 2);
    }

    #[test]
    fn receive_without_location_keeps_package_expecting() {
        let h = harness(false);
        let package = h.register(NewPackage::new("CHR", 1));

        match h.engine.receive(&ctx(), package.id, None).unwrap_err() {
            EngineError::Domain(DomainError::BadOrMissingField(field)) if field == "location_id" => {}
            other => panic!("expected BadOrMissingField(location_id), got {other:?}"),
        }
        let stored = h.engine.package(package.id).unwrap();
        assert_eq!(stored.state, PackageState::Expecting);
        assert_eq!(stored.inventory_number, None);
        assert_eq!(h.numbers.next(), "000001");
    }

    #[test]
    fn receive_is_idempotent_and_draws_one_number() {
        let h = harness(false);
        let shelf = h.shelf();
        let package = h.received(2, shelf);
        assert_eq!(package.inventory_number.as_deref(), Some("000001"));

        let again = h.engine.receive(&ctx(), package.id, Some(shelf)).unwrap();
        assert!(again.success);
        assert!(again.packages_inventory.is_empty());
        assert_eq!(again.package.quantities.on_hand, 2);
        assert_eq!(h.numbers.next(), "000002");
    }

    #[test]
    fn receive_rejects_unknown_location() {
        let h = harness(false);
        let package = h.register(NewPackage::new("CHR", 1));
        let err = h.engine.receive(&ctx(), package.id, Some(LocationId::new())).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "location", .. }));
    }

    #[test]
    fn mark_missing_twice_equals_once() {
        let h = harness(false);
        let package = h.received(3, h.shelf());

        let first = h.engine.mark_missing(&ctx(), package.id).unwrap();
        assert_eq!(first.package.state, PackageState::Missing);
        assert_eq!(first.package.location_id, None);
        assert_eq!(first.package.received_at, None);
        assert!(!first.package.allow_web_publish);
        assert_eq!(first.package.quantities.on_hand, 0);
        // Removal from Stockit succeeded (sync off), so the number is dropped.
        assert_eq!(first.package.inventory_number, None);
        let version = h.engine.aggregate(package.id).unwrap().version();

        let second = h.engine.mark_missing(&ctx(), package.id).unwrap();
        assert_eq!(second.package, first.package);
        assert_eq!(h.engine.aggregate(package.id).unwrap().version(), version);
        assert!(h.engine.aggregate(package.id).unwrap().locations().is_empty());
    }

    #[test]
    fn missing_package_can_be_received_again() {
        let h = harness(false);
        let l1 = h.shelf();
        let l2 = h.shelf();
        let package = h.received(3, l1);
        h.engine.mark_missing(&ctx(), package.id).unwrap();

        let back = h.engine.receive(&ctx(), package.id, Some(l2)).unwrap();
        assert_eq!(back.package.state, PackageState::Received);
        assert!(back.package.inventory_number.is_some());
        assert_eq!(back.package.quantities.on_hand, 3);
        let agg = h.engine.aggregate(package.id).unwrap();
        assert_eq!(agg.locations().quantity_at(l2), 3);
        // Genesis is written once; missing and its return net out.
        let actions: Vec<LedgerAction> = agg.ledger().entries().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![LedgerAction::Receive, LedgerAction::Uninventory, LedgerAction::Inventory]
        );
    }

    #[test]
    fn missing_package_cannot_be_designated_or_destroyed() {
        let h = harness(false);
        let order = h.order();
        let package = h.received(5, h.shelf());

        let missing = h.engine.mark_missing(&ctx(), package.id).unwrap();
        assert_eq!(missing.package.quantities.on_hand, 0);
        assert_eq!(missing.package.quantities.available, 0);
        assert_eq!(missing.packages_inventory.len(), 1);
        assert_eq!(missing.packages_inventory[0].quantity, -5);
        let version = h.engine.aggregate(package.id).unwrap().version();

        match h.engine.designate(&ctx(), package.id, order, 3, None).unwrap_err() {
            EngineError::Domain(DomainError::InvalidOperation(_)) => {}
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
        // Sync is off, so the number was dropped along with the Stockit item.
        assert_eq!(missing.package.inventory_number, None);
        match h.engine.destroy(&ctx(), package.id).unwrap_err() {
            EngineError::Domain(DomainError::InventorizedPackage(_)) => {}
            other => panic!("expected InventorizedPackage, got {other:?}"),
        }
        assert_eq!(h.engine.aggregate(package.id).unwrap().version(), version);
    }

    #[test]
    fn quantity_changes_respect_location_and_available() {
        let h = harness(false);
        let shelf = h.shelf();
        let order = h.order();
        let package = h.received(5, shelf);
        h.engine.designate(&ctx(), package.id, order, 4, None).unwrap();

        let trash = |quantity| QuantityChange {
            action: LedgerAction::Trash,
            quantity,
            location_id: shelf,
            source: Some("Crossroads recycling".into()),
            description: None,
        };
        let err = h.engine.register_quantity_change(&ctx(), package.id, trash(2)).unwrap_err();
        assert_eq!(err.field(), "quantity");

        let outcome = h.engine.register_quantity_change(&ctx(), package.id, trash(1)).unwrap();
        assert_eq!(outcome.package.quantities.on_hand, 4);
        assert_eq!(outcome.package.quantities.available, 0);
        assert_eq!(
            outcome.packages_inventory[0].source,
            Some(LedgerSource::ProcessingDestination("Crossroads recycling".into()))
        );

        let gain = QuantityChange {
            action: LedgerAction::Gain,
            quantity: 2,
            location_id: shelf,
            source: None,
            description: Some("found in stock take".into()),
        };
        let outcome = h.engine.register_quantity_change(&ctx(), package.id, gain).unwrap();
        assert_eq!(outcome.package.quantities.available, 2);
        assert_consistent(&outcome.package);
    }

    #[test]
    fn destroy_only_applies_to_uninventorized_packages() {
        let h = harness(false);
        let received = h.received(1, h.shelf());
        match h.engine.destroy(&ctx(), received.id).unwrap_err() {
            EngineError::Domain(DomainError::InventorizedPackage(number)) => assert_eq!(number, "000001"),
            other => panic!("unexpected error: {other:?}"),
        }

        let expecting = h.register(NewPackage::new("CHR", 1));
        let destroyed = h.engine.destroy(&ctx(), expecting.id).unwrap();
        assert!(destroyed.package.deleted_at.is_some());
        // Soft delete: still loadable.
        assert!(h.engine.package(expecting.id).is_ok());
    }

    #[test]
    fn receive_creates_item_in_stockit_and_links_it() {
        let h = harness(true);
        let shelf = h.shelf();
        let package = h.received(1, shelf);

        assert_eq!(package.stockit.stockit_id, Some(1000));
        let requests = h.stockit.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].action, SyncAction::Create);
        assert_eq!(requests[0].body["item"]["inventory_number"], "X000001");
        assert_eq!(requests[0].body["item"]["location_id"], 501);
    }

    #[test]
    fn stockit_failure_is_reported_but_receipt_stands() {
        let h = harness(true);
        let shelf = h.shelf();
        let package = h.register(NewPackage::new("CHR", 1));
        h.stockit.fail_next(SyncError::Timeout(5000));

        let outcome = h.engine.receive(&ctx(), package.id, Some(shelf)).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_for("connection_error").is_some());
        assert_eq!(outcome.package.state, PackageState::Received);
        assert_eq!(outcome.package.stockit.stockit_id, None);
        assert_eq!(outcome.package.quantities.on_hand, 1);
    }

    #[test]
    fn rejected_stockit_removal_keeps_inventory_number() {
        let h = harness(true);
        let package = h.received(1, h.shelf());
        h.stockit
            .fail_next(SyncError::Rejected(BTreeMap::from([("id".into(), "is locked".into())])));

        let outcome = h.engine.mark_missing(&ctx(), package.id).unwrap();
        assert_eq!(outcome.error_for("id"), Some("is locked"));
        assert_eq!(outcome.package.state, PackageState::Missing);
        assert_eq!(outcome.package.inventory_number.as_deref(), Some("000001"));
        assert_eq!(outcome.package.stockit.stockit_id, Some(1000));
    }

    #[test]
    fn changes_from_stockit_are_not_echoed() {
        let h = harness(true);
        let shelf = h.shelf();
        let package = h.register(NewPackage::new("CHR", 1));
        let from_stockit = OperationContext::new(UserId::new(), Origin::Stockit);

        h.engine.receive(&from_stockit, package.id, Some(shelf)).unwrap();
        h.engine.move_quantity(&from_stockit, package.id, 1, shelf, h.shelf()).unwrap();
        assert!(h.stockit.requests().is_empty());
        assert!(h.jobs.pending_for(package.id).unwrap().is_empty());
    }

    #[test]
    fn queued_sync_jobs_run_in_order_per_package() {
        let h = harness(true);
        let l1 = h.shelf();
        let order = h.order();
        let package = h.received(1, l1);

        h.engine.move_quantity(&ctx(), package.id, 1, l1, h.shelf()).unwrap();
        h.engine.designate(&ctx(), package.id, order, 1, None).unwrap();
        h.engine.dispatch(&ctx(), package.id, order, 1, None).unwrap();

        let pending: Vec<SyncAction> = h
            .jobs
            .pending_for(package.id)
            .unwrap()
            .iter()
            .map(|j| j.action)
            .collect();
        assert_eq!(pending, vec![SyncAction::Move, SyncAction::Update, SyncAction::Dispatch]);

        let ran = h.engine.sync_executor().run_until_idle();
        assert_eq!(ran, 3);
        assert_eq!(
            h.stockit.actions(),
            vec![SyncAction::Create, SyncAction::Move, SyncAction::Update, SyncAction::Dispatch]
        );
        let dispatch = &h.stockit.requests()[3];
        assert_eq!(dispatch.body["item"]["designation_id"], 42);
        assert_eq!(dispatch.body["item"]["location_id"], 1);
    }

    #[test]
    fn failed_job_is_retried_before_later_jobs_run() {
        let h = harness(true);
        let l1 = h.shelf();
        let package = h.received(1, l1);
        h.engine.move_quantity(&ctx(), package.id, 1, l1, h.shelf()).unwrap();
        h.engine
            .register_quantity_change(
                &ctx(),
                package.id,
                QuantityChange {
                    action: LedgerAction::Gain,
                    quantity: 1,
                    location_id: l1,
                    source: None,
                    description: None,
                },
            )
            .unwrap();

        h.stockit.fail_next(SyncError::Transport("connection reset".into()));
        h.engine.sync_executor().run_until_idle();

        // Move failed once, then succeeded on retry before the update went out.
        assert_eq!(
            h.stockit.actions(),
            vec![SyncAction::Create, SyncAction::Move, SyncAction::Move, SyncAction::Update]
        );
        assert!(h.jobs.pending_for(package.id).unwrap().is_empty());
    }

    #[test]
    fn bulk_packages_are_not_moved_in_stockit() {
        let h = harness(true);
        let l1 = h.shelf();
        let package = h.received(3, l1);
        h.engine.move_quantity(&ctx(), package.id, 1, l1, h.shelf()).unwrap();
        assert!(h.jobs.pending_for(package.id).unwrap().is_empty());
    }

    #[test]
    fn purge_removes_package_and_queues_stockit_delete() {
        let h = harness(true);
        let package = h.received(1, h.shelf());

        let outcome = h.engine.purge(&ctx(), package.id).unwrap();
        assert!(outcome.package.deleted_at.is_some());
        assert!(matches!(
            h.engine.package(package.id),
            Err(EngineError::NotFound { entity: "package", .. })
        ));

        let queued = h.jobs.pending_for(package.id).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].action, SyncAction::Delete);
        assert_eq!(queued[0].stockit_id, Some(1000));

        h.engine.sync_executor().run_until_idle();
        let delete = h.stockit.requests().pop().unwrap();
        assert_eq!(delete.action, SyncAction::Delete);
        assert_eq!(delete.body, serde_json::json!({ "id": 1000 }));

        // The released number is handed out again.
        assert_eq!(h.numbers.next(), "000001");
    }

    #[test]
    fn purge_refuses_designated_packages() {
        let h = harness(false);
        let order = h.order();
        let package = h.received(2, h.shelf());
        h.engine.designate(&ctx(), package.id, order, 1, None).unwrap();

        match h.engine.purge(&ctx(), package.id).unwrap_err() {
            EngineError::Domain(DomainError::InvalidOperation(msg)) if msg.contains("designated") => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.engine.package(package.id).is_ok());
    }

    #[test]
    fn package_sets_follow_membership() {
        let h = harness(false);
        let shelf = h.shelf();
        let item = ItemId::new();
        let ids: Vec<PackageId> = (0..3)
            .map(|_| {
                let p = h.register(NewPackage::new("CHR", 1).for_item(item));
                h.engine.receive(&ctx(), p.id, Some(shelf)).unwrap();
                p.id
            })
            .collect();
        let lowest = *ids.iter().min().unwrap();
        for id in &ids {
            assert_eq!(h.engine.package(*id).unwrap().package_set_id, Some(lowest));
        }

        // Detaching the lowest member re-keys the remaining two.
        h.engine.remove_from_set(&ctx(), lowest).unwrap();
        let rest: Vec<PackageId> = ids.iter().copied().filter(|id| *id != lowest).collect();
        let next_lowest = *rest.iter().min().unwrap();
        assert_eq!(h.engine.package(lowest).unwrap().package_set_id, None);
        for id in &rest {
            assert_eq!(h.engine.package(*id).unwrap().package_set_id, Some(next_lowest));
        }

        // Any later refresh takes the detached package back in.
        h.engine.mark_missing(&ctx(), rest[0]).unwrap();
        assert_eq!(h.engine.package(rest[0]).unwrap().package_set_id, None);
        assert_eq!(h.engine.package(lowest).unwrap().package_set_id, Some(lowest));
        assert_eq!(h.engine.package(rest[1]).unwrap().package_set_id, Some(lowest));

        // A lone member is not a set.
        h.engine.mark_missing(&ctx(), rest[1]).unwrap();
        assert_eq!(h.engine.package(lowest).unwrap().package_set_id, None);
    }

    #[test]
    fn committed_operations_are_published() {
        let h = harness(false);
        let subscription = h.bus.subscribe();
        let package = h.received(2, h.shelf());

        let envelopes = subscription.drain();
        assert_eq!(envelopes.len(), 1);
        let envelope = &envelopes[0];
        assert_eq!(envelope.package_id(), package.id);
        assert_eq!(envelope.aggregate_type(), "inventory.package");
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.payload().event_type(), "inventory.package.received");
        assert_eq!(envelope.payload().entries.len(), 1);
    }

    #[test]
    fn concurrent_writers_on_one_package_are_serialized() {
        let h = harness_with(InMemoryPackageStore::new(), false, 64);
        let shelf = h.shelf();
        let package = h.received(1, shelf);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..5 {
                        let gain = QuantityChange {
                            action: LedgerAction::Gain,
                            quantity: 1,
                            location_id: shelf,
                            source: None,
                            description: None,
                        };
                        h.engine.register_quantity_change(&ctx(), package.id, gain).unwrap();
                    }
                });
            }
        });

        let agg = h.engine.aggregate(package.id).unwrap();
        assert_eq!(agg.quantities().on_hand, 41);
        assert_eq!(agg.locations().quantity_at(shelf), 41);
        assert_eq!(agg.ledger().len(), 41);
        let sequences: Vec<u64> = agg.ledger().entries().iter().map(|e: &LedgerEntry| e.sequence).collect();
        assert_eq!(sequences, (1..=41).collect::<Vec<u64>>());
    }

    /// Store whose commits always lose the race.
    struct AlwaysStale(InMemoryPackageStore);

    impl PackageStore for AlwaysStale {
        fn insert(&self, aggregate: PackageAggregate) -> Result<(), StoreError> {
            self.0.insert(aggregate)
        }

        fn load(&self, package_id: PackageId) -> Result<Option<PackageAggregate>, StoreError> {
            self.0.load(package_id)
        }

        fn commit(&self, _aggregate: PackageAggregate, expected: ExpectedVersion) -> Result<(), StoreError> {
            Err(StoreError::Concurrency(format!("{expected:?} is stale")))
        }

        fn remove(&self, package_id: PackageId, expected: ExpectedVersion) -> Result<(), StoreError> {
            self.0.remove(package_id, expected)
        }

        fn packages_for_item(&self, item_id: ItemId) -> Result<Vec<Package>, StoreError> {
            self.0.packages_for_item(item_id)
        }

        fn entries_from_source(&self, source: &LedgerSource) -> Result<Vec<LedgerEntry>, StoreError> {
            self.0.entries_from_source(source)
        }
    }

    #[test]
    fn conflicts_give_up_after_configured_retries() {
        let h = harness_with(AlwaysStale(InMemoryPackageStore::new()), false, 2);
        let shelf = h.shelf();
        let package = h.register(NewPackage::new("CHR", 1));

        match h.engine.receive(&ctx(), package.id, Some(shelf)).unwrap_err() {
            EngineError::ConcurrencyExhausted { package_id, attempts } => {
                assert_eq!(package_id, package.id);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The drawn inventory number went back to the pool.
        assert_eq!(h.numbers.next(), "000001");
    }
}
