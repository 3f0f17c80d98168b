//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic, local failure: the operation that raised it
/// is aborted as a whole. Failures talking to the external inventory system are
/// not domain errors; infra attaches them to the operation outcome instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A user-correctable constraint on a field was violated.
    #[error("{field} {message}")]
    Validation { field: String, message: String },

    /// A required field was blank or unusable.
    #[error("bad or missing field: {0}")]
    BadOrMissingField(String),

    /// A derived quantity counter would drop below zero.
    #[error("{field} cannot be negative (would be {value})")]
    NegativeQuantity { field: String, value: i64 },

    /// A location does not hold enough of the package.
    #[error(
        "location {location_id} holds {available}, cannot take {requested}"
    )]
    InsufficientLocationQuantity {
        location_id: String,
        requested: i64,
        available: i64,
    },

    /// The operation does not make sense for this package (e.g. packing into a
    /// non-container, marking a boxed package missing).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The package is tracked by the external inventory system and cannot be
    /// soft-deleted.
    #[error("package {0} is inventorized and cannot be destroyed")]
    InventorizedPackage(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (stale version).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::BadOrMissingField(field.into())
    }

    pub fn negative(field: impl Into<String>, value: i64) -> Self {
        Self::NegativeQuantity {
            field: field.into(),
            value,
        }
    }

    pub fn insufficient_location(
        location_id: impl core::fmt::Display,
        requested: i64,
        available: i64,
    ) -> Self {
        Self::InsufficientLocationQuantity {
            location_id: location_id.to_string(),
            requested,
            available,
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Field key under which the error is reported back to callers.
    pub fn field(&self) -> &str {
        match self {
            DomainError::Validation { field, .. } => field,
            DomainError::BadOrMissingField(field) => field,
            DomainError::NegativeQuantity { field, .. } => field,
            DomainError::InsufficientLocationQuantity { .. } => "location_id",
            DomainError::InventorizedPackage(_) => "inventory_number",
            DomainError::InvalidId(_) => "id",
            DomainError::InvalidOperation(_)
            | DomainError::NotFound
            | DomainError::Conflict(_) => "base",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_keyed_by_field() {
        assert_eq!(DomainError::validation("quantity", "too big").field(), "quantity");
        assert_eq!(DomainError::missing_field("location_id").field(), "location_id");
        assert_eq!(
            DomainError::insufficient_location("L1", 10, 5).field(),
            "location_id"
        );
        assert_eq!(DomainError::invalid_operation("nope").field(), "base");
    }

    #[test]
    fn messages_are_readable() {
        let err = DomainError::insufficient_location("L1", 10, 5);
        assert_eq!(err.to_string(), "location L1 holds 5, cannot take 10");
        let err = DomainError::negative("available_quantity", -2);
        assert_eq!(err.to_string(), "available_quantity cannot be negative (would be -2)");
    }
}
