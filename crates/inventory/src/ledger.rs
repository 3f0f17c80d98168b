//! Append-only quantity ledger (`packages_inventory`).
//!
//! Every quantity change to a package is written here as a signed delta.
//! Positive deltas enter the package's on-hand pool, negative ones leave it.
//! Designation entries are recorded for audit but excluded from the pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use goodstock_core::{
    DomainError, DomainResult, Entity, EntryId, LocationId, OperationContext, OrderId, PackageId,
    UserId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Receive,
    Gain,
    Move,
    Pack,
    Unpack,
    Trash,
    Process,
    Recycle,
    Loss,
    Designate,
    Undesignate,
    Dispatch,
    Undispatch,
    /// Takes the on-hand quantity out of stock when a package goes missing.
    Uninventory,
    /// Puts it back when a missing package is received again.
    Inventory,
}

impl LedgerAction {
    /// Every action that contributes to on-hand quantity.
    pub const ON_HAND: &'static [LedgerAction] = &[
        LedgerAction::Receive,
        LedgerAction::Gain,
        LedgerAction::Move,
        LedgerAction::Pack,
        LedgerAction::Unpack,
        LedgerAction::Trash,
        LedgerAction::Process,
        LedgerAction::Recycle,
        LedgerAction::Loss,
        LedgerAction::Dispatch,
        LedgerAction::Undispatch,
        LedgerAction::Uninventory,
        LedgerAction::Inventory,
    ];

    /// Entries written by `mark_missing` and the receive that follows it.
    pub const INVENTORY: &'static [LedgerAction] = &[LedgerAction::Uninventory, LedgerAction::Inventory];

    /// Actions that remove stock to a processing destination.
    pub const LOSSES: &'static [LedgerAction] = &[
        LedgerAction::Trash,
        LedgerAction::Process,
        LedgerAction::Recycle,
        LedgerAction::Loss,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LedgerAction::Receive => "receive",
            LedgerAction::Gain => "gain",
            LedgerAction::Move => "move",
            LedgerAction::Pack => "pack",
            LedgerAction::Unpack => "unpack",
            LedgerAction::Trash => "trash",
            LedgerAction::Process => "process",
            LedgerAction::Recycle => "recycle",
            LedgerAction::Loss => "loss",
            LedgerAction::Designate => "designate",
            LedgerAction::Undesignate => "undesignate",
            LedgerAction::Dispatch => "dispatch",
            LedgerAction::Undispatch => "undispatch",
            LedgerAction::Uninventory => "uninventory",
            LedgerAction::Inventory => "inventory",
        }
    }

    pub fn counts_on_hand(self) -> bool {
        Self::ON_HAND.contains(&self)
    }

    pub fn is_loss(self) -> bool {
        Self::LOSSES.contains(&self)
    }

    /// Whether a delta for this action must be positive (`Some(true)`),
    /// negative (`Some(false)`) or may be either (`None`, moves).
    pub fn incremental(self) -> Option<bool> {
        match self {
            LedgerAction::Receive
            | LedgerAction::Gain
            | LedgerAction::Unpack
            | LedgerAction::Undesignate
            | LedgerAction::Undispatch
            | LedgerAction::Inventory => Some(true),
            LedgerAction::Pack
            | LedgerAction::Trash
            | LedgerAction::Process
            | LedgerAction::Recycle
            | LedgerAction::Loss
            | LedgerAction::Designate
            | LedgerAction::Dispatch
            | LedgerAction::Uninventory => Some(false),
            LedgerAction::Move => None,
        }
    }
}

impl core::fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl core::str::FromStr for LedgerAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            LedgerAction::Receive,
            LedgerAction::Gain,
            LedgerAction::Move,
            LedgerAction::Pack,
            LedgerAction::Unpack,
            LedgerAction::Trash,
            LedgerAction::Process,
            LedgerAction::Recycle,
            LedgerAction::Loss,
            LedgerAction::Designate,
            LedgerAction::Undesignate,
            LedgerAction::Dispatch,
            LedgerAction::Undispatch,
            LedgerAction::Uninventory,
            LedgerAction::Inventory,
        ];
        all.into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| DomainError::validation("action", format!("unknown action {s:?}")))
    }
}

/// What a ledger entry's quantity came from or went to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum LedgerSource {
    /// Container package for pack/unpack.
    Package(PackageId),
    /// Processing destination for trash/process/recycle/loss.
    ProcessingDestination(String),
    /// Order for designation and dispatch.
    Order(OrderId),
}

impl LedgerSource {
    pub fn container(&self) -> Option<PackageId> {
        match self {
            LedgerSource::Package(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFilter<'a> {
    Any,
    Only(&'a LedgerSource),
}

impl SourceFilter<'_> {
    fn accepts(&self, source: Option<&LedgerSource>) -> bool {
        match self {
            SourceFilter::Any => true,
            SourceFilter::Only(wanted) => source == Some(*wanted),
        }
    }
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub package_id: PackageId,
    /// 1-based position in the package's ledger.
    pub sequence: u64,
    pub action: LedgerAction,
    pub quantity: i64,
    pub location_id: Option<LocationId>,
    pub source: Option<LedgerSource>,
    pub actor: UserId,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for LedgerEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Everything needed to write one entry, minus identity and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub action: LedgerAction,
    pub quantity: i64,
    pub location_id: Option<LocationId>,
    pub source: Option<LedgerSource>,
    pub description: Option<String>,
}

impl EntryDraft {
    pub fn new(action: LedgerAction, quantity: i64) -> Self {
        Self {
            action,
            quantity,
            location_id: None,
            source: None,
            description: None,
        }
    }

    pub fn at(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn at_opt(mut self, location_id: Option<LocationId>) -> Self {
        self.location_id = location_id;
        self
    }

    pub fn from_source(mut self, source: LedgerSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn described(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// A single package's ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    package_id: PackageId,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(package_id: PackageId) -> Self {
        Self {
            package_id,
            entries: Vec::new(),
        }
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the entry that would be written after `offset` other pending drafts.
    ///
    /// Does not touch the ledger; commands draft entries and `apply` appends them.
    pub fn draft(&self, offset: usize, draft: EntryDraft, ctx: &OperationContext) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(),
            package_id: self.package_id,
            sequence: (self.entries.len() + offset + 1) as u64,
            action: draft.action,
            quantity: draft.quantity,
            location_id: draft.location_id,
            source: draft.source,
            actor: ctx.actor,
            description: draft.description,
            created_at: ctx.occurred_at,
        }
    }

    /// Append a previously drafted entry.
    pub fn append(&mut self, entry: LedgerEntry) -> DomainResult<()> {
        if entry.package_id != self.package_id {
            return Err(DomainError::invalid_operation(format!(
                "entry for package {} cannot go into ledger of {}",
                entry.package_id, self.package_id
            )));
        }
        let expected = self.entries.len() as u64 + 1;
        if entry.sequence != expected {
            return Err(DomainError::conflict(format!(
                "ledger sequence gap (expected {expected}, got {})",
                entry.sequence
            )));
        }
        let wrong_sign = match entry.action.incremental() {
            Some(positive) => entry.quantity != 0 && (entry.quantity > 0) != positive,
            None => false,
        };
        if wrong_sign {
            return Err(DomainError::validation(
                "quantity",
                format!("wrong sign for {} entry", entry.action),
            ));
        }
        let delta = if entry.action.counts_on_hand() { entry.quantity } else { 0 };
        if self.on_hand().checked_add(delta).is_none() {
            return Err(DomainError::validation("quantity", "is too large"));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Draft and append in one step.
    pub fn record(&mut self, draft: EntryDraft, ctx: &OperationContext) -> DomainResult<LedgerEntry> {
        let entry = self.draft(0, draft, ctx);
        self.append(entry.clone())?;
        Ok(entry)
    }

    pub fn quantity_delta(&self, actions: &[LedgerAction], source: SourceFilter<'_>) -> i64 {
        quantity_delta(&self.entries, actions, source)
    }

    pub fn on_hand(&self) -> i64 {
        self.quantity_delta(LedgerAction::ON_HAND, SourceFilter::Any)
    }

    /// Quantity taken out by `uninventory` entries and not yet put back.
    pub fn uninventoried(&self) -> i64 {
        self.quantity_delta(LedgerAction::INVENTORY, SourceFilter::Any)
            .saturating_neg()
    }

    /// True once a `receive` entry exists; genesis is written at most once.
    pub fn has_genesis(&self) -> bool {
        self.entries.iter().any(|e| e.action == LedgerAction::Receive)
    }
}

/// Sum the deltas of `entries` matching `actions` and `source`.
///
/// Works over any slice so callers can aggregate across packages (containers).
/// Saturates instead of overflowing. A single ledger's on-hand total never
/// gets there: `append` rejects entries that would push it past `i64::MAX`.
pub fn quantity_delta(entries: &[LedgerEntry], actions: &[LedgerAction], source: SourceFilter<'_>) -> i64 {
    entries
        .iter()
        .filter(|e| actions.contains(&e.action) && source.accepts(e.source.as_ref()))
        .fold(0i64, |total, e| total.saturating_add(e.quantity))
}
