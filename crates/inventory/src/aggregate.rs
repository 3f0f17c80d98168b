//! The package aggregate: a package together with its ledger, location
//! allocations and order claims, mutated only as one unit.

use serde::{Deserialize, Serialize};

use goodstock_core::{
    Aggregate, AggregateRoot, ClaimId, DomainError, DomainResult, LocationId, OperationContext,
    OrderId, PackageId,
};

use crate::claim::{ClaimEvent, OrderSummary, OrdersPackage};
use crate::containment::{self, ContainerRef};
use crate::events::{PackageChange, PackageEvent};
use crate::ledger::{EntryDraft, Ledger, LedgerAction, LedgerSource};
use crate::lifecycle::{self, Lifecycle, LifecycleEvent, PackageState};
use crate::location::LocationAllocations;
use crate::package::{Package, StorageType};
use crate::quantity::Quantities;

/// Command: check a package in at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receive {
    pub location_id: Option<LocationId>,
    /// Number to assign when the package is not inventorized yet.
    pub inventory_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveQuantity {
    pub quantity: i64,
    pub from: LocationId,
    pub to: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designate {
    pub order: OrderSummary,
    pub quantity: i64,
    pub shipping_number: Option<i64>,
    /// Id for the claim if a new one has to be created.
    pub claim_id: Option<ClaimId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Undesignate {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub order: OrderSummary,
    pub quantity: i64,
    pub location_id: Option<LocationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Undispatch {
    pub order: OrderSummary,
    /// Defaults to everything dispatched on the order.
    pub quantity: Option<i64>,
    pub location_id: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub container: ContainerRef,
    pub quantity: i64,
    pub location_id: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unpack {
    pub container: ContainerRef,
    pub quantity: i64,
    pub location_id: LocationId,
}

/// Command: trash/process/recycle/loss (removal) or gain (addition) at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub action: LedgerAction,
    /// Always positive; the action decides the direction.
    pub quantity: i64,
    pub location_id: LocationId,
    /// Processing destination for removals.
    pub source: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageOp {
    Receive(Receive),
    MarkMissing,
    Move(MoveQuantity),
    Designate(Designate),
    Undesignate(Undesignate),
    Dispatch(Dispatch),
    Undispatch(Undispatch),
    Pack(Pack),
    Unpack(Unpack),
    RegisterQuantityChange(QuantityChange),
    Destroy,
    Purge,
    LinkExternal { stockit_id: i64 },
    UnlinkExternal,
    AssignSet { set_id: Option<PackageId> },
}

impl PackageOp {
    pub fn name(&self) -> &'static str {
        match self {
            PackageOp::Receive(_) => "receive",
            PackageOp::MarkMissing => "mark_missing",
            PackageOp::Move(_) => "move",
            PackageOp::Designate(_) => "designate",
            PackageOp::Undesignate(_) => "undesignate",
            PackageOp::Dispatch(_) => "dispatch",
            PackageOp::Undispatch(_) => "undispatch",
            PackageOp::Pack(_) => "pack",
            PackageOp::Unpack(_) => "unpack",
            PackageOp::RegisterQuantityChange(_) => "register_quantity_change",
            PackageOp::Destroy => "destroy",
            PackageOp::Purge => "purge",
            PackageOp::LinkExternal { .. } => "link_external",
            PackageOp::UnlinkExternal => "unlink_external",
            PackageOp::AssignSet { .. } => "assign_set",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCommand {
    pub context: OperationContext,
    pub op: PackageOp,
}

impl PackageCommand {
    pub fn new(context: OperationContext, op: PackageOp) -> Self {
        Self { context, op }
    }
}

/// Aggregate root: a package and everything whose consistency depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAggregate {
    package: Package,
    locations: LocationAllocations,
    claims: Vec<OrdersPackage>,
    ledger: Ledger,
    version: u64,
}

impl PackageAggregate {
    /// Wrap a freshly built package (version 0, empty ledger).
    pub fn new(package: Package) -> Self {
        let id = package.id;
        Self {
            package,
            locations: LocationAllocations::new(id),
            claims: Vec::new(),
            ledger: Ledger::new(id),
            version: 0,
        }
    }

    /// Reassemble an aggregate from stored parts.
    pub fn from_parts(
        package: Package,
        locations: LocationAllocations,
        claims: Vec<OrdersPackage>,
        ledger: Ledger,
        version: u64,
    ) -> Self {
        Self {
            package,
            locations,
            claims,
            ledger,
            version,
        }
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn locations(&self) -> &LocationAllocations {
        &self.locations
    }

    pub fn claims(&self) -> &[OrdersPackage] {
        &self.claims
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn quantities(&self) -> Quantities {
        self.package.quantities
    }

    /// Active claim of `order_id`, if any.
    pub fn claim_for(&self, order_id: OrderId) -> Option<&OrdersPackage> {
        self.claims
            .iter()
            .find(|c| c.order_id == order_id && c.is_active())
    }

    pub fn has_open_designation(&self) -> bool {
        self.claims.iter().any(|c| c.is_active() && c.remaining() > 0)
    }

    /// Run `command` on a scratch copy. Returns the next state and the events
    /// it committed; an `Err` or an empty event list leaves `self` as it was.
    pub fn execute(&self, command: &PackageCommand) -> DomainResult<(Self, Vec<PackageEvent>)> {
        let Some((change, drafts)) = self.decide(command)? else {
            return Ok((self.clone(), Vec::new()));
        };

        let ctx = &command.context;
        let entries = drafts
            .into_iter()
            .enumerate()
            .map(|(offset, draft)| self.ledger.draft(offset, draft, ctx))
            .collect();
        let event = PackageEvent {
            package_id: self.package.id,
            context: *ctx,
            change,
            entries,
        };

        let mut next = self.clone();
        next.evolve(&event)?;
        next.package.quantities.validate(next.locations.total())?;
        next.version += 1;
        Ok((next, vec![event]))
    }

    fn decide(&self, command: &PackageCommand) -> DomainResult<Option<(PackageChange, Vec<EntryDraft>)>> {
        match &command.op {
            PackageOp::Receive(cmd) => self.decide_receive(cmd),
            PackageOp::MarkMissing => self.decide_mark_missing(),
            PackageOp::Move(cmd) => self.decide_move(cmd).map(Some),
            PackageOp::Designate(cmd) => self.decide_designate(cmd).map(Some),
            PackageOp::Undesignate(cmd) => self.decide_undesignate(cmd).map(Some),
            PackageOp::Dispatch(cmd) => self.decide_dispatch(cmd).map(Some),
            PackageOp::Undispatch(cmd) => self.decide_undispatch(cmd).map(Some),
            PackageOp::Pack(cmd) => {
                self.ensure_received()?;
                containment::check_pack(&self.package, &self.locations, &cmd.container, cmd.quantity, cmd.location_id)?;
                let draft = EntryDraft::new(LedgerAction::Pack, -cmd.quantity)
                    .at(cmd.location_id)
                    .from_source(cmd.container.source());
                Ok(Some((
                    PackageChange::Packed {
                        container: cmd.container,
                        quantity: cmd.quantity,
                        location_id: cmd.location_id,
                    },
                    vec![draft],
                )))
            }
            PackageOp::Unpack(cmd) => {
                self.ensure_live()?;
                containment::check_unpack(self.ledger.entries(), &cmd.container, cmd.quantity)?;
                let draft = EntryDraft::new(LedgerAction::Unpack, cmd.quantity)
                    .at(cmd.location_id)
                    .from_source(cmd.container.source());
                Ok(Some((
                    PackageChange::Unpacked {
                        container: cmd.container,
                        quantity: cmd.quantity,
                        location_id: cmd.location_id,
                    },
                    vec![draft],
                )))
            }
            PackageOp::RegisterQuantityChange(cmd) => self.decide_quantity_change(cmd).map(Some),
            PackageOp::Destroy => {
                // Any ledger row means the package was inventorized at some point,
                // even if going missing has since cleared its number.
                if self.package.is_inventorized() || !self.ledger.is_empty() {
                    let number = self.package.inventory_number.clone().unwrap_or_default();
                    return Err(DomainError::InventorizedPackage(number));
                }
                lifecycle::ensure_unpacked(&self.package, &self.ledger)?;
                if self.package.is_deleted() {
                    return Ok(None);
                }
                Ok(Some((PackageChange::Destroyed, Vec::new())))
            }
            PackageOp::Purge => {
                if self.has_open_designation() {
                    return Err(DomainError::invalid_operation(
                        "package is designated and cannot be deleted",
                    ));
                }
                lifecycle::ensure_unpacked(&self.package, &self.ledger)?;
                Ok(Some((PackageChange::Purged, Vec::new())))
            }
            PackageOp::LinkExternal { stockit_id } => {
                if self.package.stockit.stockit_id == Some(*stockit_id) {
                    return Ok(None);
                }
                Ok(Some((PackageChange::ExternalLinked { stockit_id: *stockit_id }, Vec::new())))
            }
            PackageOp::UnlinkExternal => {
                if self.package.stockit.stockit_id.is_none() && self.package.inventory_number.is_none() {
                    return Ok(None);
                }
                Ok(Some((PackageChange::ExternalUnlinked, Vec::new())))
            }
            PackageOp::AssignSet { set_id } => {
                if self.package.package_set_id == *set_id {
                    return Ok(None);
                }
                Ok(Some((PackageChange::SetAssigned { set_id: *set_id }, Vec::new())))
            }
        }
    }

    fn ensure_live(&self) -> DomainResult<()> {
        if self.package.is_deleted() {
            return Err(DomainError::invalid_operation("package has been destroyed"));
        }
        Ok(())
    }

    /// Stock can only be moved, claimed or counted while the package is on the shelf.
    fn ensure_received(&self) -> DomainResult<()> {
        self.ensure_live()?;
        if self.package.state != PackageState::Received {
            return Err(DomainError::invalid_operation(format!(
                "package is {}, not received",
                self.package.state
            )));
        }
        Ok(())
    }

    fn decide_mark_missing(&self) -> DomainResult<Option<(PackageChange, Vec<EntryDraft>)>> {
        if self.package.state == PackageState::Missing {
            return Ok(None);
        }
        lifecycle::ensure_unpacked(&self.package, &self.ledger)?;
        if self.has_open_designation() {
            return Err(DomainError::invalid_operation(
                "package is designated and cannot be marked missing",
            ));
        }
        let on_hand = self.ledger.on_hand();
        let drafts = if on_hand > 0 {
            vec![EntryDraft::new(LedgerAction::Uninventory, -on_hand)]
        } else {
            Vec::new()
        };
        Ok(Some((PackageChange::MarkedMissing, drafts)))
    }

    fn decide_receive(&self, cmd: &Receive) -> DomainResult<Option<(PackageChange, Vec<EntryDraft>)>> {
        self.ensure_live()?;
        if self.package.state == PackageState::Received {
            return Ok(None);
        }
        let genesis = !self.ledger.has_genesis();
        let location_id = cmd.location_id;
        if location_id.is_none() && (genesis || !self.package.is_inventorized()) {
            return Err(DomainError::missing_field("location_id"));
        }

        let inventory_number = if self.package.is_inventorized() {
            None
        } else {
            match cmd.inventory_number.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => Some(n.to_string()),
                _ => return Err(DomainError::missing_field("inventory_number")),
            }
        };

        let mut drafts = Vec::new();
        let restored = self.ledger.uninventoried();
        if !genesis && restored > 0 {
            drafts.push(EntryDraft::new(LedgerAction::Inventory, restored).at_opt(location_id));
        }
        let allocated = match location_id {
            Some(location_id) if genesis => {
                drafts.push(EntryDraft::new(LedgerAction::Receive, self.package.received_quantity).at(location_id));
                self.package.received_quantity
            }
            Some(_) => (self.ledger.on_hand().saturating_add(restored) - self.locations.total()).max(0),
            None => 0,
        };

        Ok(Some((
            PackageChange::Received {
                location_id,
                inventory_number,
                allocated,
            },
            drafts,
        )))
    }

    fn decide_move(&self, cmd: &MoveQuantity) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        self.ensure_received()?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        let held = self.locations.quantity_at(cmd.from);
        if held < cmd.quantity {
            return Err(DomainError::insufficient_location(cmd.from, cmd.quantity, held));
        }
        let drafts = vec![
            EntryDraft::new(LedgerAction::Move, -cmd.quantity).at(cmd.from),
            EntryDraft::new(LedgerAction::Move, cmd.quantity).at(cmd.to),
        ];
        Ok((
            PackageChange::Moved {
                quantity: cmd.quantity,
                from: cmd.from,
                to: cmd.to,
            },
            drafts,
        ))
    }

    fn decide_designate(&self, cmd: &Designate) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        self.ensure_received()?;
        cmd.order.ensure_open()?;
        let total = if self.package.is_singleton() {
            self.package.received_quantity
        } else {
            cmd.quantity
        };
        if total <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }

        let existing = self.claim_for(cmd.order.id);
        let (claim_id, current, dispatched) = match existing {
            Some(c) => (c.id, c.quantity, c.dispatched_quantity),
            None => (cmd.claim_id.unwrap_or_default(), 0, 0),
        };
        if total < dispatched {
            return Err(DomainError::validation(
                "quantity",
                format!("cannot be less than the {dispatched} already dispatched"),
            ));
        }
        let increase = total - current;
        let available = self.package.quantities.available;
        if increase > available {
            return Err(DomainError::validation(
                "quantity",
                format!("only {available} available to designate"),
            ));
        }

        let source = LedgerSource::Order(cmd.order.id);
        let drafts = match increase {
            0 => Vec::new(),
            n if n > 0 => vec![EntryDraft::new(LedgerAction::Designate, -n).from_source(source)],
            n => vec![EntryDraft::new(LedgerAction::Undesignate, -n).from_source(source)],
        };
        Ok((
            PackageChange::Designated {
                claim_id,
                order_id: cmd.order.id,
                quantity: total,
                shipping_number: cmd.shipping_number,
            },
            drafts,
        ))
    }

    fn decide_undesignate(&self, cmd: &Undesignate) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        let claim = self
            .claim_for(cmd.order_id)
            .filter(|c| c.remaining() > 0)
            .ok_or_else(|| {
                DomainError::invalid_operation(format!("package is not designated to order {}", cmd.order_id))
            })?;
        let drafts = vec![
            EntryDraft::new(LedgerAction::Undesignate, claim.remaining())
                .from_source(LedgerSource::Order(cmd.order_id)),
        ];
        Ok((
            PackageChange::Undesignated {
                claim_id: claim.id,
                order_id: cmd.order_id,
            },
            drafts,
        ))
    }

    fn decide_dispatch(&self, cmd: &Dispatch) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        self.ensure_received()?;
        cmd.order.ensure_open()?;
        let claim = self
            .claim_for(cmd.order.id)
            .filter(|c| c.state == crate::claim::ClaimState::Designated)
            .ok_or_else(|| {
                DomainError::invalid_operation(format!("package is not designated to order {}", cmd.order.code))
            })?;

        let quantity = if self.package.is_singleton() {
            claim.remaining()
        } else {
            cmd.quantity
        };
        if quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        if quantity > claim.remaining() {
            return Err(DomainError::validation(
                "quantity",
                format!("only {} designated to this order", claim.remaining()),
            ));
        }

        if self.locations.is_empty() {
            return Err(DomainError::invalid_operation(
                "package has no location to dispatch from",
            ));
        }
        let location_id = match cmd.location_id.or_else(|| self.locations.sole_location()) {
            Some(id) => id,
            None => return Err(DomainError::missing_field("location_id")),
        };
        let held = self.locations.quantity_at(location_id);
        if held < quantity {
            return Err(DomainError::insufficient_location(location_id, quantity, held));
        }

        let draft = EntryDraft::new(LedgerAction::Dispatch, -quantity)
            .at(location_id)
            .from_source(LedgerSource::Order(cmd.order.id));
        Ok((
            PackageChange::Dispatched {
                claim_id: claim.id,
                order_id: cmd.order.id,
                quantity,
                location_id,
            },
            vec![draft],
        ))
    }

    fn decide_undispatch(&self, cmd: &Undispatch) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        self.ensure_received()?;
        cmd.order.ensure_open()?;
        let claim = self
            .claim_for(cmd.order.id)
            .filter(|c| c.dispatched_quantity > 0)
            .ok_or_else(|| {
                DomainError::invalid_operation(format!("nothing dispatched to order {}", cmd.order.code))
            })?;
        let quantity = cmd.quantity.unwrap_or(claim.dispatched_quantity);
        if quantity <= 0 || quantity > claim.dispatched_quantity {
            return Err(DomainError::validation(
                "quantity",
                format!("must be between 1 and {}", claim.dispatched_quantity),
            ));
        }
        let draft = EntryDraft::new(LedgerAction::Undispatch, quantity)
            .at(cmd.location_id)
            .from_source(LedgerSource::Order(cmd.order.id));
        Ok((
            PackageChange::Undispatched {
                claim_id: claim.id,
                order_id: cmd.order.id,
                quantity,
                location_id: cmd.location_id,
            },
            vec![draft],
        ))
    }

    fn decide_quantity_change(&self, cmd: &QuantityChange) -> DomainResult<(PackageChange, Vec<EntryDraft>)> {
        self.ensure_received()?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity", "must be greater than 0"));
        }
        let signed = if cmd.action.is_loss() {
            let held = self.locations.quantity_at(cmd.location_id);
            if held < cmd.quantity {
                return Err(DomainError::insufficient_location(cmd.location_id, cmd.quantity, held));
            }
            let available = self.package.quantities.available;
            if cmd.quantity > available {
                return Err(DomainError::validation(
                    "quantity",
                    format!("only {available} available"),
                ));
            }
            -cmd.quantity
        } else if cmd.action == LedgerAction::Gain {
            cmd.quantity
        } else {
            return Err(DomainError::invalid_operation(format!(
                "{} is not a quantity change action",
                cmd.action
            )));
        };

        let mut draft = EntryDraft::new(cmd.action, signed)
            .at(cmd.location_id)
            .described(cmd.description.clone());
        if let Some(destination) = cmd.source.as_ref().filter(|_| signed < 0) {
            draft = draft.from_source(LedgerSource::ProcessingDestination(destination.clone()));
        }
        Ok((
            PackageChange::QuantityChanged {
                action: cmd.action,
                quantity: signed,
                location_id: cmd.location_id,
            },
            vec![draft],
        ))
    }

    /// Apply an event: append its entries, run its change, recompute counters.
    fn evolve(&mut self, event: &PackageEvent) -> DomainResult<()> {
        for entry in &event.entries {
            self.ledger.append(entry.clone())?;
        }

        let ctx = &event.context;
        let today = ctx.occurred_at.date_naive();
        match &event.change {
            PackageChange::Received {
                location_id,
                inventory_number,
                allocated,
            } => {
                if let Some(number) = inventory_number {
                    self.package.inventory_number = Some(number.clone());
                }
                self.lifecycle(ctx).fire(LifecycleEvent::MarkReceived)?;
                if let Some(location_id) = location_id {
                    if *allocated > 0 {
                        self.locations.allocate(*location_id, *allocated)?;
                    }
                    self.package.location_id = Some(*location_id);
                }
            }
            PackageChange::MarkedMissing => {
                self.lifecycle(ctx).fire(LifecycleEvent::MarkMissing)?;
            }
            PackageChange::Moved { quantity, from, to } => {
                self.locations.move_quantity(*quantity, *from, *to)?;
                self.package.location_id = Some(*to);
                self.package.stockit.moved_on = Some(today);
                self.package.stockit.moved_by = Some(ctx.actor);
            }
            PackageChange::Designated {
                claim_id,
                order_id,
                quantity,
                shipping_number,
            } => {
                let package_id = self.package.id;
                let claim = match self.claims.iter().position(|c| c.id == *claim_id) {
                    Some(idx) => &mut self.claims[idx],
                    None => {
                        let mut claim = OrdersPackage::new(package_id, *order_id, *quantity);
                        claim.id = *claim_id;
                        self.claims.push(claim);
                        let last = self.claims.len() - 1;
                        &mut self.claims[last]
                    }
                };
                claim.quantity = *quantity;
                if shipping_number.is_some() {
                    claim.shipping_number = *shipping_number;
                }
                claim.fire(ClaimEvent::Designate)?;
                self.package.order_id = Some(*order_id);
                self.package.stockit.designated_on = Some(today);
                self.package.stockit.designated_by = Some(ctx.actor);
            }
            PackageChange::Undesignated { claim_id, .. } => {
                let claim = self.claim_mut(*claim_id)?;
                claim.quantity = claim.dispatched_quantity;
                if claim.dispatched_quantity == 0 {
                    claim.fire(ClaimEvent::Cancel)?;
                } else {
                    claim.fire(ClaimEvent::Dispatch)?;
                }
                self.refresh_designation();
            }
            PackageChange::Dispatched {
                claim_id,
                quantity,
                location_id,
                ..
            } => {
                let claim = self.claim_mut(*claim_id)?;
                claim.dispatched_quantity += *quantity;
                if claim.remaining() == 0 {
                    claim.fire(ClaimEvent::Dispatch)?;
                }
                self.locations.deallocate(*location_id, *quantity)?;
                if self.package.is_singleton() || self.ledger.on_hand() == 0 {
                    self.package.clear_parent_containers();
                    self.package.stockit.sent_on = Some(today);
                    self.package.stockit.sent_by = Some(ctx.actor);
                }
            }
            PackageChange::Undispatched {
                claim_id,
                quantity,
                location_id,
                ..
            } => {
                let claim = self.claim_mut(*claim_id)?;
                claim.dispatched_quantity -= *quantity;
                claim.fire(ClaimEvent::Designate)?;
                self.locations.allocate(*location_id, *quantity)?;
                self.package.location_id = Some(*location_id);
                self.package.stockit.sent_on = None;
                self.package.stockit.sent_by = None;
            }
            PackageChange::Packed {
                container,
                quantity,
                location_id,
            } => {
                self.locations.deallocate(*location_id, *quantity)?;
                match container.storage_type {
                    StorageType::Box => self.package.box_id = Some(container.id),
                    StorageType::Pallet => self.package.pallet_id = Some(container.id),
                    StorageType::Package => {
                        return Err(DomainError::invalid_operation("cannot pack into a Package"));
                    }
                }
            }
            PackageChange::Unpacked {
                container,
                quantity,
                location_id,
            } => {
                self.locations.allocate(*location_id, *quantity)?;
                self.package.location_id = Some(*location_id);
                if containment::quantity_in_container(self.ledger.entries(), container.id) <= 0 {
                    if self.package.box_id == Some(container.id) {
                        self.package.box_id = None;
                    }
                    if self.package.pallet_id == Some(container.id) {
                        self.package.pallet_id = None;
                    }
                }
            }
            PackageChange::QuantityChanged {
                quantity,
                location_id,
                ..
            } => {
                if *quantity > 0 {
                    self.locations.allocate(*location_id, *quantity)?;
                } else {
                    self.locations.deallocate(*location_id, -*quantity)?;
                }
            }
            PackageChange::Destroyed | PackageChange::Purged => {
                self.package.deleted_at = Some(ctx.occurred_at);
                self.locations.clear();
            }
            PackageChange::ExternalLinked { stockit_id } => {
                self.package.stockit.stockit_id = Some(*stockit_id);
            }
            PackageChange::ExternalUnlinked => {
                self.package.stockit.stockit_id = None;
                self.package.inventory_number = None;
            }
            PackageChange::SetAssigned { set_id } => {
                self.package.package_set_id = *set_id;
            }
        }

        self.package.quantities = Quantities::recompute(&self.ledger, &self.claims);
        Ok(())
    }

    fn lifecycle(&mut self, ctx: &OperationContext) -> Lifecycle<'_> {
        Lifecycle {
            package: &mut self.package,
            locations: &mut self.locations,
            ledger: &self.ledger,
            at: ctx.occurred_at,
        }
    }

    fn claim_mut(&mut self, claim_id: ClaimId) -> DomainResult<&mut OrdersPackage> {
        self.claims
            .iter_mut()
            .find(|c| c.id == claim_id)
            .ok_or_else(DomainError::not_found)
    }

    /// Point `order_id` at the remaining open designation, clearing it when none is left.
    fn refresh_designation(&mut self) {
        match self.claims.iter().find(|c| c.is_active() && c.remaining() > 0) {
            Some(open) => self.package.order_id = Some(open.order_id),
            None => {
                self.package.order_id = None;
                self.package.stockit.designated_on = None;
                self.package.stockit.designated_by = None;
            }
        }
    }
}

impl AggregateRoot for PackageAggregate {
    type Id = PackageId;

    fn id(&self) -> &Self::Id {
        &self.package.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PackageAggregate {
    type Command = PackageCommand;
    type Event = PackageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        if let Err(err) = self.evolve(event) {
            debug_assert!(false, "replayed event failed to apply: {err}");
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.execute(command).map(|(_, events)| events)
    }
}
