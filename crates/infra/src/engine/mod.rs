//! Package operation pipeline.
//!
//! Every mutation runs the same loop:
//!
//! ```text
//! load package record (version v)
//!   ↓
//! decide on a scratch copy (ledger entries, counters, locations, claims)
//!   ↓
//! commit with ExpectedVersion::Exact(v)  ── conflict ──→ reload and retry
//!   ↓
//! publish envelopes, route Stockit sync (inline or queued job)
//! ```
//!
//! Domain failures abort before anything is written. Sync failures never roll
//! back the local commit; they are reported on the returned outcome.

mod outcome;
mod routing;
pub mod sync_jobs;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use goodstock_core::{AggregateRoot, ExpectedVersion, ItemId, LocationId, OperationContext, OrderId, PackageId};
use goodstock_events::{EventBus, EventEnvelope};
use goodstock_inventory::{
    containment, package_set, ContainerRef, Designate, Dispatch, LedgerEntry, LedgerSource, MoveQuantity,
    OrderSummary, Pack, Package, PackageAggregate, PackageCommand, PackageEvent, PackageOp, PackageState,
    QuantityChange, Receive, Undesignate, Undispatch, Unpack,
};

use crate::config::InventoryConfig;
use crate::directory::{InventoryNumbers, LocationDirectory, OrderDirectory};
use crate::jobs::{Job, JobExecutor, RetryPolicy, SyncJobStore};
use crate::store::{PackageStore, StoreError};
use crate::sync::{ExternalInventory, SyncAction, SyncAdapter};

pub use outcome::{EngineError, OperationOutcome, OutcomeError};

use outcome::Committed;
use routing::SyncRoute;

/// Aggregate type tag on published envelopes.
pub const AGGREGATE_TYPE: &str = "inventory.package";

/// Lookups into the rest of the platform.
#[derive(Clone)]
pub struct Directories {
    pub orders: Arc<dyn OrderDirectory>,
    pub locations: Arc<dyn LocationDirectory>,
    pub numbers: Arc<dyn InventoryNumbers>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Reloads after an optimistic-concurrency conflict before giving up.
    pub commit_retries: u32,
    /// Policy for queued sync jobs.
    pub retry_policy: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&InventoryConfig::default())
    }
}

impl From<&InventoryConfig> for EngineSettings {
    fn from(config: &InventoryConfig) -> Self {
        Self {
            commit_retries: config.commit_retries,
            retry_policy: config.retry_policy(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PackTask {
    Pack,
    Unpack,
}

/// A pack or unpack request as the stock app sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRequest {
    pub container_id: PackageId,
    pub package_id: PackageId,
    pub quantity: i64,
    pub location_id: LocationId,
    pub task: PackTask,
}

pub struct InventoryEngine<S, B, E> {
    store: Arc<S>,
    bus: B,
    sync: Arc<SyncAdapter<E>>,
    jobs: Arc<dyn SyncJobStore>,
    directories: Directories,
    settings: EngineSettings,
}

impl<S, B, E> InventoryEngine<S, B, E>
where
    S: PackageStore + 'static,
    B: EventBus<EventEnvelope<PackageEvent>>,
    E: ExternalInventory + 'static,
{
    pub fn new(
        store: Arc<S>,
        bus: B,
        sync: Arc<SyncAdapter<E>>,
        jobs: Arc<dyn SyncJobStore>,
        directories: Directories,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            bus,
            sync,
            jobs,
            directories,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<dyn SyncJobStore> {
        &self.jobs
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    /// Executor that drains this engine's queued sync jobs.
    pub fn sync_executor(&self) -> JobExecutor<Arc<dyn SyncJobStore>> {
        JobExecutor::new(
            self.jobs.clone(),
            sync_jobs::handler(self.store.clone(), self.sync.clone()),
        )
    }

    /// Store a newly created package (state `expecting`, empty ledger).
    pub fn register(&self, package: Package) -> Result<Package, EngineError> {
        let aggregate = PackageAggregate::new(package);
        let package = aggregate.package().clone();
        self.store.insert(aggregate)?;
        debug!(package_id = %package.id, "package registered");
        Ok(package)
    }

    // ---- queries ----

    pub fn aggregate(&self, package_id: PackageId) -> Result<PackageAggregate, EngineError> {
        self.store
            .load(package_id)?
            .ok_or_else(|| EngineError::not_found("package", package_id))
    }

    pub fn package(&self, package_id: PackageId) -> Result<Package, EngineError> {
        Ok(self.aggregate(package_id)?.package().clone())
    }

    pub fn ledger(&self, package_id: PackageId) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.aggregate(package_id)?.ledger().entries().to_vec())
    }

    /// Net quantity of each package currently inside `container_id`.
    pub fn contained_quantities(&self, container_id: PackageId) -> Result<BTreeMap<PackageId, i64>, EngineError> {
        let entries = self.store.entries_from_source(&LedgerSource::Package(container_id))?;
        Ok(containment::contained_quantities(container_id, &entries))
    }

    pub fn containers_of(&self, package_id: PackageId) -> Result<BTreeSet<PackageId>, EngineError> {
        Ok(containment::containers_of(self.aggregate(package_id)?.ledger().entries()))
    }

    pub fn total_quantity_in(&self, container_id: PackageId) -> Result<i64, EngineError> {
        let entries = self.store.entries_from_source(&LedgerSource::Package(container_id))?;
        Ok(containment::total_quantity_in(container_id, &entries))
    }

    // ---- lifecycle ----

    /// Check a package in. Draws an inventory number if it has none yet.
    pub fn receive(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        location_id: Option<LocationId>,
    ) -> Result<OperationOutcome, EngineError> {
        if let Some(location_id) = location_id {
            self.ensure_location(location_id)?;
        }

        let numbers = &self.directories.numbers;
        let mut drawn: Option<String> = None;
        let result = self.execute(ctx, package_id, |aggregate| {
            let package = aggregate.package();
            // Drawing is skipped when the decision will fail or no-op anyway.
            let needs_number = !package.is_inventorized()
                && location_id.is_some()
                && package.state != PackageState::Received;
            let inventory_number = needs_number.then(|| drawn.get_or_insert_with(|| numbers.next()).clone());
            Ok(PackageOp::Receive(Receive {
                location_id,
                inventory_number,
            }))
        });

        if let Some(number) = &drawn {
            let used = matches!(&result, Ok(c) if c.after.package().inventory_number.as_ref() == Some(number));
            if !used {
                numbers.release(number);
            }
        }

        let committed = result?;
        let mut outcome = self.finish(ctx, committed)?;
        self.refresh_package_set(ctx, &outcome.package, None)?;
        self.reload(&mut outcome)?;
        Ok(outcome)
    }

    pub fn mark_missing(&self, ctx: &OperationContext, package_id: PackageId) -> Result<OperationOutcome, EngineError> {
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::MarkMissing))?;
        let mut outcome = self.finish(ctx, committed)?;
        self.refresh_package_set(ctx, &outcome.package, None)?;
        self.reload(&mut outcome)?;
        Ok(outcome)
    }

    /// Soft-delete a package that was never inventorized.
    pub fn destroy(&self, ctx: &OperationContext, package_id: PackageId) -> Result<OperationOutcome, EngineError> {
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::Destroy))?;
        self.finish(ctx, committed)
    }

    /// Hard-delete an inventorized package, release its inventory number and
    /// queue the Stockit delete.
    pub fn purge(&self, ctx: &OperationContext, package_id: PackageId) -> Result<OperationOutcome, EngineError> {
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::Purge))?;
        let after = &committed.after;
        let package = after.package();

        self.store.remove(package_id, ExpectedVersion::Exact(after.version()))?;

        if !ctx.is_from_stockit() && self.sync.applies(SyncAction::Delete, after) {
            if let Some(stockit_id) = package.stockit.stockit_id {
                self.enqueue(Job::new(package_id, SyncAction::Delete).with_stockit_id(Some(stockit_id)))?;
            }
        }
        if let Some(number) = package.inventory_number.as_deref() {
            self.directories.numbers.release(number);
        }
        info!(package_id = %package_id, action = "purge", "package purged");

        let outcome = OperationOutcome::from_committed(&committed);
        self.refresh_package_set(ctx, &outcome.package, Some(package_id))?;
        Ok(outcome)
    }

    /// Detach a package from its package set. A later refresh may add it back.
    pub fn remove_from_set(&self, ctx: &OperationContext, package_id: PackageId) -> Result<OperationOutcome, EngineError> {
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::AssignSet { set_id: None }))?;
        let mut outcome = self.finish(ctx, committed)?;
        self.refresh_package_set(ctx, &outcome.package, Some(package_id))?;
        self.reload(&mut outcome)?;
        Ok(outcome)
    }

    // ---- quantities ----

    pub fn move_quantity(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        quantity: i64,
        from: LocationId,
        to: LocationId,
    ) -> Result<OperationOutcome, EngineError> {
        self.ensure_location(to)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Move(MoveQuantity { quantity, from, to }))
        })?;
        self.finish(ctx, committed)
    }

    /// Trash/process/recycle/loss remove quantity from a location; gain adds it.
    pub fn register_quantity_change(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        change: QuantityChange,
    ) -> Result<OperationOutcome, EngineError> {
        self.ensure_location(change.location_id)?;
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::RegisterQuantityChange(change.clone())))?;
        self.finish(ctx, committed)
    }

    // ---- orders ----

    pub fn designate(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        order_id: OrderId,
        quantity: i64,
        shipping_number: Option<i64>,
    ) -> Result<OperationOutcome, EngineError> {
        let order = self.order(order_id)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Designate(Designate {
                order: order.clone(),
                quantity,
                shipping_number,
                claim_id: None,
            }))
        })?;
        self.finish(ctx, committed)
    }

    pub fn undesignate(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        order_id: OrderId,
    ) -> Result<OperationOutcome, EngineError> {
        let committed = self.execute(ctx, package_id, |_| Ok(PackageOp::Undesignate(Undesignate { order_id })))?;
        self.finish(ctx, committed)
    }

    pub fn dispatch(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        order_id: OrderId,
        quantity: i64,
        location_id: Option<LocationId>,
    ) -> Result<OperationOutcome, EngineError> {
        let order = self.order(order_id)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Dispatch(Dispatch {
                order: order.clone(),
                quantity,
                location_id,
            }))
        })?;
        let mut outcome = self.finish(ctx, committed)?;
        self.refresh_package_set(ctx, &outcome.package, None)?;
        self.reload(&mut outcome)?;
        Ok(outcome)
    }

    /// Return dispatched quantity (all of it by default) to the designation.
    pub fn undispatch(
        &self,
        ctx: &OperationContext,
        package_id: PackageId,
        order_id: OrderId,
        quantity: Option<i64>,
        location_id: LocationId,
    ) -> Result<OperationOutcome, EngineError> {
        self.ensure_location(location_id)?;
        let order = self.order(order_id)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Undispatch(Undispatch {
                order: order.clone(),
                quantity,
                location_id,
            }))
        })?;
        let mut outcome = self.finish(ctx, committed)?;
        self.refresh_package_set(ctx, &outcome.package, None)?;
        self.reload(&mut outcome)?;
        Ok(outcome)
    }

    // ---- containment ----

    pub fn pack(
        &self,
        ctx: &OperationContext,
        container_id: PackageId,
        package_id: PackageId,
        quantity: i64,
        location_id: LocationId,
    ) -> Result<OperationOutcome, EngineError> {
        let container = self.container(container_id)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Pack(Pack {
                container,
                quantity,
                location_id,
            }))
        })?;
        self.finish(ctx, committed)
    }

    pub fn unpack(
        &self,
        ctx: &OperationContext,
        container_id: PackageId,
        package_id: PackageId,
        quantity: i64,
        location_id: LocationId,
    ) -> Result<OperationOutcome, EngineError> {
        self.ensure_location(location_id)?;
        let container = self.container(container_id)?;
        let committed = self.execute(ctx, package_id, |_| {
            Ok(PackageOp::Unpack(Unpack {
                container,
                quantity,
                location_id,
            }))
        })?;
        self.finish(ctx, committed)
    }

    pub fn pack_or_unpack(&self, ctx: &OperationContext, request: &PackRequest) -> Result<OperationOutcome, EngineError> {
        match request.task {
            PackTask::Pack => self.pack(
                ctx,
                request.container_id,
                request.package_id,
                request.quantity,
                request.location_id,
            ),
            PackTask::Unpack => self.unpack(
                ctx,
                request.container_id,
                request.package_id,
                request.quantity,
                request.location_id,
            ),
        }
    }

    // ---- pipeline ----

    /// Load, decide, commit; reload and retry on version conflicts.
    fn execute<F>(&self, ctx: &OperationContext, package_id: PackageId, mut make_op: F) -> Result<Committed, EngineError>
    where
        F: FnMut(&PackageAggregate) -> Result<PackageOp, EngineError>,
    {
        let attempts = self.settings.commit_retries + 1;
        for attempt in 1..=attempts {
            let before = self.aggregate(package_id)?;
            let command = PackageCommand::new(*ctx, make_op(&before)?);
            let (after, events) = before.execute(&command)?;
            if events.is_empty() {
                debug!(package_id = %package_id, action = command.op.name(), "no change");
                return Ok(Committed { after, events });
            }

            match self.store.commit(after.clone(), ExpectedVersion::Exact(before.version())) {
                Ok(()) => {
                    info!(
                        package_id = %package_id,
                        action = command.op.name(),
                        quantity = op_quantity(&command.op),
                        version = after.version(),
                        "package operation committed"
                    );
                    self.publish(ctx, &after, &events);
                    return Ok(Committed { after, events });
                }
                Err(StoreError::Concurrency(msg)) => {
                    debug!(package_id = %package_id, attempt, error = %msg, "commit conflict, reloading");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(EngineError::ConcurrencyExhausted { package_id, attempts })
    }

    fn publish(&self, ctx: &OperationContext, after: &PackageAggregate, events: &[PackageEvent]) {
        for event in events {
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                event.package_id,
                AGGREGATE_TYPE,
                after.version(),
                ctx.origin,
                event.clone(),
            );
            if let Err(err) = self.bus.publish(envelope) {
                warn!(package_id = %event.package_id, error = ?err, "failed to publish package event");
            }
        }
    }

    /// Build the outcome and route Stockit sync for what was committed.
    fn finish(&self, ctx: &OperationContext, committed: Committed) -> Result<OperationOutcome, EngineError> {
        let mut outcome = OperationOutcome::from_committed(&committed);
        if ctx.is_from_stockit() {
            return Ok(outcome);
        }

        let mut current = committed.after;
        for event in &committed.events {
            match routing::route(&event.change, current.package()) {
                SyncRoute::Inline(SyncAction::Delete) => {
                    let result = self.sync.delete(&current);
                    if result.is_success() {
                        current = self.execute(ctx, current.package().id, |_| Ok(PackageOp::UnlinkExternal))?.after;
                    } else {
                        outcome.attach(&result.errors);
                    }
                }
                SyncRoute::Inline(action) => {
                    let result = self.sync.sync(action, &current);
                    outcome.attach(&result.errors);
                    if let Some(stockit_id) = result.item_id {
                        current = self
                            .execute(ctx, current.package().id, |_| Ok(PackageOp::LinkExternal { stockit_id }))?
                            .after;
                    }
                }
                SyncRoute::Deferred(action) => {
                    if self.sync.applies(action, &current) {
                        let job = Job::new(current.package().id, action)
                            .with_stockit_id(current.package().stockit.stockit_id)
                            .with_retry_policy(self.settings.retry_policy.clone());
                        self.enqueue(job)?;
                    }
                }
                SyncRoute::Skip => {}
            }
        }
        outcome.package = current.package().clone();
        Ok(outcome)
    }

    fn enqueue(&self, job: Job) -> Result<(), EngineError> {
        let (package_id, action) = (job.package_id, job.action);
        let job_id = self.jobs.enqueue(job)?;
        debug!(job_id = %job_id, package_id = %package_id, action = %action, "sync job queued");
        Ok(())
    }

    /// Recompute `package_set_id` across the item's packages.
    fn refresh_package_set(
        &self,
        ctx: &OperationContext,
        package: &Package,
        exclude: Option<PackageId>,
    ) -> Result<(), EngineError> {
        let Some(item_id) = package.item_id else {
            return Ok(());
        };
        for (id, set_id) in self.set_changes(item_id, exclude)? {
            self.execute(ctx, id, |_| Ok(PackageOp::AssignSet { set_id }))?;
        }
        Ok(())
    }

    fn set_changes(&self, item_id: ItemId, exclude: Option<PackageId>) -> Result<Vec<(PackageId, Option<PackageId>)>, EngineError> {
        let packages = self.store.packages_for_item(item_id)?;
        Ok(package_set::resolve(packages.iter().filter(|p| Some(p.id) != exclude)))
    }

    fn reload(&self, outcome: &mut OperationOutcome) -> Result<(), EngineError> {
        if let Some(aggregate) = self.store.load(outcome.package.id)? {
            outcome.package = aggregate.package().clone();
        }
        Ok(())
    }

    fn order(&self, order_id: OrderId) -> Result<OrderSummary, EngineError> {
        self.directories
            .orders
            .order(order_id)
            .ok_or_else(|| EngineError::not_found("order", order_id))
    }

    fn container(&self, container_id: PackageId) -> Result<ContainerRef, EngineError> {
        Ok(ContainerRef::of(self.aggregate(container_id)?.package()))
    }

    fn ensure_location(&self, location_id: LocationId) -> Result<(), EngineError> {
        if self.directories.locations.contains(location_id) {
            Ok(())
        } else {
            Err(EngineError::not_found("location", location_id))
        }
    }
}

fn op_quantity(op: &PackageOp) -> i64 {
    match op {
        PackageOp::Move(c) => c.quantity,
        PackageOp::Designate(c) => c.quantity,
        PackageOp::Dispatch(c) => c.quantity,
        PackageOp::Undispatch(c) => c.quantity.unwrap_or_default(),
        PackageOp::Pack(c) => c.quantity,
        PackageOp::Unpack(c) => c.quantity,
        PackageOp::RegisterQuantityChange(c) => c.quantity,
        _ => 0,
    }
}
