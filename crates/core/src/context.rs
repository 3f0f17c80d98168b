//! Explicit request context for inventory operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Application a request originated from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Warehouse stock application.
    StockApp,
    /// Staff admin application.
    AdminApp,
    /// The external Stockit system pushing its own changes.
    Stockit,
}

/// Who is acting, from where, and at what business time.
///
/// Passed explicitly to every operation; nothing in the engine reads ambient
/// "current user" state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub actor: UserId,
    pub origin: Origin,
    pub occurred_at: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(actor: UserId, origin: Origin) -> Self {
        Self {
            actor,
            origin,
            occurred_at: Utc::now(),
        }
    }

    pub fn stock_app(actor: UserId) -> Self {
        Self::new(actor, Origin::StockApp)
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Changes coming from Stockit must not be mirrored back to it.
    pub fn is_from_stockit(&self) -> bool {
        self.origin == Origin::Stockit
    }
}
