//! Order claims on a package (`orders_packages`) and the order view they need.

use serde::{Deserialize, Serialize};

use goodstock_core::{ClaimId, DomainError, DomainResult, Entity, OrderId, PackageId};

use crate::fsm::{StateMachine, Stateful};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    #[default]
    Requested,
    Designated,
    Dispatched,
    Cancelled,
}

impl ClaimState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Requested => "requested",
            ClaimState::Designated => "designated",
            ClaimState::Dispatched => "dispatched",
            ClaimState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClaimEvent {
    Designate,
    Dispatch,
    Cancel,
}

/// Order states as seen by the inventory engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Draft,
    Submitted,
    Processing,
    AwaitingDispatch,
    Dispatching,
    Closed,
    Cancelled,
}

impl OrderState {
    pub fn is_finished(self) -> bool {
        matches!(self, OrderState::Closed | OrderState::Cancelled)
    }
}

/// Read-only summary of an order, supplied by the order directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub state: OrderState,
    pub code: String,
    /// Designation id on the Stockit side.
    pub stockit_id: Option<i64>,
}

impl OrderSummary {
    pub fn ensure_open(&self) -> DomainResult<()> {
        if self.state.is_finished() {
            return Err(DomainError::invalid_operation(format!(
                "order {} is {:?}",
                self.code, self.state
            )));
        }
        Ok(())
    }
}

/// A package × order claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdersPackage {
    pub id: ClaimId,
    pub package_id: PackageId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub dispatched_quantity: i64,
    pub state: ClaimState,
    pub shipping_number: Option<i64>,
}

impl Entity for OrdersPackage {
    type Id = ClaimId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Stateful for OrdersPackage {
    type State = ClaimState;

    fn state(&self) -> ClaimState {
        self.state
    }

    fn set_state(&mut self, state: ClaimState) {
        self.state = state;
    }
}

impl OrdersPackage {
    pub fn new(package_id: PackageId, order_id: OrderId, quantity: i64) -> Self {
        Self {
            id: ClaimId::new(),
            package_id,
            order_id,
            quantity,
            dispatched_quantity: 0,
            state: ClaimState::Requested,
            shipping_number: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != ClaimState::Cancelled
    }

    /// Designated quantity not yet dispatched.
    pub fn remaining(&self) -> i64 {
        (self.quantity - self.dispatched_quantity).max(0)
    }

    pub fn machine() -> StateMachine<ClaimEvent, ClaimState, OrdersPackage> {
        StateMachine::new("orders_package")
            .on(
                ClaimEvent::Designate,
                &[ClaimState::Requested, ClaimState::Designated, ClaimState::Cancelled, ClaimState::Dispatched],
                ClaimState::Designated,
            )
            .guard(has_remaining)
            .on(ClaimEvent::Dispatch, &[ClaimState::Designated], ClaimState::Dispatched)
            .guard(fully_dispatched)
            .on(
                ClaimEvent::Cancel,
                &[ClaimState::Requested, ClaimState::Designated],
                ClaimState::Cancelled,
            )
            .guard(nothing_dispatched)
    }

    pub fn fire(&mut self, event: ClaimEvent) -> DomainResult<ClaimState> {
        Self::machine().fire(self, event)
    }
}

fn has_remaining(claim: &OrdersPackage) -> DomainResult<()> {
    if claim.quantity <= claim.dispatched_quantity {
        return Err(DomainError::validation(
            "quantity",
            "nothing left to designate on this order",
        ));
    }
    Ok(())
}

fn fully_dispatched(claim: &OrdersPackage) -> DomainResult<()> {
    if claim.dispatched_quantity < claim.quantity {
        return Err(DomainError::invalid_operation(format!(
            "{} of {} still to dispatch",
            claim.remaining(),
            claim.quantity
        )));
    }
    Ok(())
}

fn nothing_dispatched(claim: &OrdersPackage) -> DomainResult<()> {
    if claim.dispatched_quantity > 0 {
        return Err(DomainError::invalid_operation(
            "claim has dispatched quantity and cannot be cancelled",
        ));
    }
    Ok(())
}
