//! `goodstock-core`: ids, errors, aggregate traits and operation context.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error taxonomy, aggregate traits and the explicit
//! operation context threaded through every inventory operation.

pub mod aggregate;
pub mod context;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use context::{OperationContext, Origin};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ClaimId, EntryId, ItemId, LocationId, OrderId, PackageId, UserId};
