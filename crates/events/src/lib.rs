//! Post-commit domain events and their distribution.
//!
//! Operations return the events they committed; infra wraps them in envelopes
//! and publishes them on a bus for sync routing and other subscribers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
