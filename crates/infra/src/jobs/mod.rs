//! Deferred Stockit sync jobs with retry, backoff and dead-letter handling.
//!
//! ## Design
//!
//! - One job is one Stockit call for one package
//! - Jobs of a package run strictly in enqueue order
//! - Failed calls back off and retry, doubling the wait by default
//! - Dead-letter queue for jobs that exhaust their attempts

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStoreError, SyncJobStore};
pub use types::{AttemptRecord, Backoff, DeadLetterEntry, Job, JobId, JobResult, JobStatus, RetryPolicy};
