//! Package inventory domain module.
//!
//! Business rules for physical stock units: the append-only ledger, derived
//! quantity counters, location allocation, box/pallet containment, the package
//! lifecycle and order designation/dispatch. Everything here is deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod aggregate;
pub mod claim;
pub mod containment;
pub mod detail;
pub mod events;
pub mod fsm;
pub mod ledger;
pub mod lifecycle;
pub mod location;
pub mod package;
pub mod package_set;
pub mod quantity;

pub use aggregate::{
    Designate, Dispatch, MoveQuantity, Pack, PackageAggregate, PackageCommand, PackageOp,
    QuantityChange, Receive, Undesignate, Undispatch, Unpack,
};
pub use claim::{ClaimState, OrderState, OrderSummary, OrdersPackage};
pub use containment::ContainerRef;
pub use detail::{DetailBuilder, DetailKind, PackageDetail};
pub use events::{PackageChange, PackageEvent};
pub use ledger::{EntryDraft, Ledger, LedgerAction, LedgerEntry, LedgerSource, SourceFilter};
pub use lifecycle::PackageState;
pub use location::{LocationAllocations, PackageLocation};
pub use package::{Dimensions, NewPackage, Package, StockitMirror, StorageType};
pub use quantity::Quantities;
