use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use goodstock_core::{DomainError, PackageId};
use goodstock_inventory::{LedgerEntry, Package, PackageAggregate, PackageEvent};

use crate::jobs::JobStoreError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeError {
    pub field: String,
    pub message: String,
}

/// What a mutation left behind.
///
/// `success` is false when the local change committed but a follow-up (such
/// as the Stockit mirror) reported errors; those are listed in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub package: Package,
    pub success: bool,
    pub errors: Vec<OutcomeError>,
    /// Ledger entries written by this operation.
    pub packages_inventory: Vec<LedgerEntry>,
}

impl OperationOutcome {
    pub(crate) fn from_committed(committed: &Committed) -> Self {
        Self {
            package: committed.after.package().clone(),
            success: true,
            errors: Vec::new(),
            packages_inventory: committed
                .events
                .iter()
                .flat_map(|e| e.entries.iter().cloned())
                .collect(),
        }
    }

    pub(crate) fn attach(&mut self, errors: &BTreeMap<String, String>) {
        for (field, message) in errors {
            self.errors.push(OutcomeError {
                field: field.clone(),
                message: message.clone(),
            });
        }
        self.success = self.errors.is_empty();
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

/// Result of one successful commit (or a no-op decision).
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub after: PackageAggregate,
    pub events: Vec<PackageEvent>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync job store: {0}")]
    Jobs(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("package {package_id}: gave up after {attempts} conflicting commits")]
    ConcurrencyExhausted { package_id: PackageId, attempts: u32 },
}

impl From<JobStoreError> for EngineError {
    fn from(value: JobStoreError) -> Self {
        EngineError::Jobs(value.to_string())
    }
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Field key the error should be reported under.
    pub fn field(&self) -> &str {
        match self {
            EngineError::Domain(e) => e.field(),
            EngineError::NotFound { entity, .. } => entity,
            EngineError::Store(_) | EngineError::Jobs(_) | EngineError::ConcurrencyExhausted { .. } => "base",
        }
    }
}
