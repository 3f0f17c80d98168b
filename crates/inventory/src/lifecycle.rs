//! Package lifecycle: `expecting`, `received`, `missing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult};

use crate::containment;
use crate::fsm::{StateMachine, Stateful};
use crate::ledger::Ledger;
use crate::location::LocationAllocations;
use crate::package::Package;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    #[default]
    Expecting,
    Missing,
    Received,
}

impl PackageState {
    pub const ALL: &'static [PackageState] = &[
        PackageState::Expecting,
        PackageState::Missing,
        PackageState::Received,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PackageState::Expecting => "expecting",
            PackageState::Missing => "missing",
            PackageState::Received => "received",
        }
    }
}

impl core::fmt::Display for PackageState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    MarkReceived,
    MarkMissing,
}

/// Borrowed view of the parts of a package aggregate the lifecycle touches.
pub struct Lifecycle<'a> {
    pub package: &'a mut Package,
    pub locations: &'a mut LocationAllocations,
    pub ledger: &'a Ledger,
    pub at: DateTime<Utc>,
}

impl Stateful for Lifecycle<'_> {
    type State = PackageState;

    fn state(&self) -> PackageState {
        self.package.state
    }

    fn set_state(&mut self, state: PackageState) {
        self.package.state = state;
    }
}

impl<'a> Lifecycle<'a> {
    pub fn machine() -> StateMachine<LifecycleEvent, PackageState, Lifecycle<'a>> {
        StateMachine::new("package")
            .on(LifecycleEvent::MarkReceived, PackageState::ALL, PackageState::Received)
            .guard(not_deleted)
            .after(stamp_received)
            .on(LifecycleEvent::MarkMissing, PackageState::ALL, PackageState::Missing)
            .guard(not_packed)
            .after(clear_placement)
    }

    pub fn fire(&mut self, event: LifecycleEvent) -> DomainResult<PackageState> {
        Self::machine().fire(self, event)
    }
}

fn not_deleted(lc: &Lifecycle<'_>) -> DomainResult<()> {
    if lc.package.is_deleted() {
        return Err(DomainError::invalid_operation("package has been destroyed"));
    }
    Ok(())
}

/// Packages sitting in a box or on a pallet must be unpacked first.
pub(crate) fn not_packed(lc: &Lifecycle<'_>) -> DomainResult<()> {
    ensure_unpacked(lc.package, lc.ledger)
}

pub(crate) fn ensure_unpacked(package: &Package, ledger: &Ledger) -> DomainResult<()> {
    if package.parent_container().is_some() || !containment::containers_of(ledger.entries()).is_empty() {
        return Err(DomainError::invalid_operation(
            "package is packed in a box or pallet",
        ));
    }
    Ok(())
}

fn stamp_received(lc: &mut Lifecycle<'_>) {
    if lc.package.received_at.is_none() {
        lc.package.received_at = Some(lc.at);
    }
}

fn clear_placement(lc: &mut Lifecycle<'_>) {
    lc.locations.clear();
    lc.package.allow_web_publish = false;
    lc.package.received_at = None;
    lc.package.location_id = None;
}
