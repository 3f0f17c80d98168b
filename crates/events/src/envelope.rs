use serde::{Deserialize, Serialize};
use uuid::Uuid;

use goodstock_core::{Origin, PackageId};

/// Envelope for a committed package event.
///
/// Notes:
/// - `sequence_number` is the package row version the event was committed at,
///   so subscribers can order events per package.
/// - `origin` lets subscribers skip echoing changes back to where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    package_id: PackageId,
    aggregate_type: String,

    /// Package version at which the event was committed.
    sequence_number: u64,
    origin: Origin,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        package_id: PackageId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        origin: Origin,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            package_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            origin,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
