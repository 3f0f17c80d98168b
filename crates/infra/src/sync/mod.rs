//! Mirroring package state to the external Stockit inventory system.
//!
//! ## Components
//!
//! - `SyncAction`: one Stockit endpoint (create, update, move, dispatch, undispatch, delete)
//! - `StockitPayload`: the `{item, package}` body most endpoints take
//! - `ExternalInventory`: transport seam; `StockitClient` speaks HTTP, `InMemoryExternalInventory` records calls
//! - `SyncAdapter`: decides whether a package is synced at all and turns results into a `SyncOutcome`

pub mod adapter;
pub mod client;
pub mod in_memory;
pub mod payload;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use adapter::SyncAdapter;
pub use client::{StockitClient, StockitClientConfig};
pub use in_memory::InMemoryExternalInventory;
pub use payload::StockitPayload;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Move,
    Dispatch,
    Undispatch,
    Delete,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Put,
}

impl SyncAction {
    pub fn name(self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Move => "move",
            SyncAction::Dispatch => "dispatch",
            SyncAction::Undispatch => "undispatch",
            SyncAction::Delete => "delete",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            SyncAction::Create => "/api/v1/items",
            SyncAction::Update => "/api/v1/items/update",
            SyncAction::Move => "/api/v1/items/move",
            SyncAction::Dispatch => "/api/v1/items/dispatch",
            SyncAction::Undispatch => "/api/v1/items/undispatch",
            SyncAction::Delete => "/api/v1/items/destroy",
        }
    }

    pub fn method(self) -> HttpMethod {
        match self {
            SyncAction::Create => HttpMethod::Post,
            _ => HttpMethod::Put,
        }
    }

    /// Stockit only tracks whole units for these.
    pub fn singleton_only(self) -> bool {
        matches!(self, SyncAction::Move | SyncAction::Dispatch | SyncAction::Undispatch)
    }
}

impl core::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub action: SyncAction,
    pub body: serde_json::Value,
}

/// Stockit's reply: `{"item_id": ..}` or `{"errors": {field: message}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub item_id: Option<i64>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("stockit request timed out after {0}ms")]
    Timeout(u64),

    #[error("stockit transport error: {0}")]
    Transport(String),

    #[error("stockit rejected the request")]
    Rejected(BTreeMap<String, String>),

    #[error("could not decode stockit response: {0}")]
    Decode(String),

    #[error("stockit sync is disabled")]
    Disabled,
}

impl SyncError {
    /// Field-keyed messages for attaching to an operation outcome.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            SyncError::Rejected(errors) if !errors.is_empty() => errors.clone(),
            other => BTreeMap::from([("connection_error".to_string(), other.to_string())]),
        }
    }
}

/// Transport to the external inventory system.
pub trait ExternalInventory: Send + Sync {
    fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError>;
}

impl<E> ExternalInventory for Arc<E>
where
    E: ExternalInventory + ?Sized,
{
    fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        (**self).send(request)
    }
}

/// Result of one sync attempt. Never an `Err`: failures are carried as field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub item_id: Option<i64>,
    pub errors: BTreeMap<String, String>,
    /// Whether a request actually went out.
    pub sent: bool,
}

impl SyncOutcome {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn failed(error: &SyncError) -> Self {
        Self {
            item_id: None,
            errors: error.field_errors(),
            sent: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_create_posts() {
        assert_eq!(SyncAction::Create.method(), HttpMethod::Post);
        assert_eq!(SyncAction::Delete.method(), HttpMethod::Put);
        assert_eq!(SyncAction::Delete.path(), "/api/v1/items/destroy");
    }

    #[test]
    fn transport_errors_become_connection_error() {
        let errors = SyncError::Timeout(5000).field_errors();
        assert!(errors["connection_error"].contains("5000ms"));

        let rejected = SyncError::Rejected(BTreeMap::from([("code_id".into(), "is invalid".into())]));
        assert_eq!(rejected.field_errors()["code_id"], "is invalid");
    }

    #[test]
    fn response_decodes_either_shape() {
        let ok: SyncResponse = serde_json::from_str(r#"{"item_id": 12}"#).unwrap();
        assert_eq!(ok.item_id, Some(12));
        let err: SyncResponse = serde_json::from_str(r#"{"errors": {"quantity": "bad"}}"#).unwrap();
        assert_eq!(err.errors["quantity"], "bad");
    }
}
