//! Infrastructure layer: package storage, the operation engine, Stockit sync,
//! deferred sync jobs, configuration and runtime wiring.

pub mod config;
pub mod directory;
pub mod engine;
pub mod jobs;
pub mod runtime;
pub mod store;
pub mod sync;

mod integration_tests;

pub use config::{ConfigError, InventoryConfig};
pub use engine::{EngineError, InventoryEngine, OperationOutcome, PackRequest, PackTask};
pub use runtime::Runtime;
