//! Runs queued Stockit sync jobs against the latest package state.

use std::sync::Arc;

use tracing::debug;

use crate::jobs::{Job, JobResult};
use crate::store::PackageStore;
use crate::sync::{ExternalInventory, SyncAction, SyncAdapter};

/// Job handler: reload the package, send the call, fail the job on any sync error.
///
/// The package is read fresh on every attempt, so a retried job mirrors the
/// state at retry time rather than the state when it was queued.
pub fn handler<S, E>(store: Arc<S>, sync: Arc<SyncAdapter<E>>) -> impl Fn(&Job) -> JobResult + Send + Sync + 'static
where
    S: PackageStore + 'static,
    E: ExternalInventory + 'static,
{
    move |job: &Job| {
        let outcome = if job.action == SyncAction::Delete {
            sync.delete_by_id(job.package_id, job.stockit_id)
        } else {
            match store.load(job.package_id) {
                Ok(Some(aggregate)) => sync.sync(job.action, &aggregate),
                Ok(None) => {
                    debug!(job_id = %job.id, package_id = %job.package_id, "package gone, nothing to sync");
                    return JobResult::Success;
                }
                Err(err) => return JobResult::Failure(err.to_string()),
            }
        };

        if outcome.is_success() {
            JobResult::Success
        } else {
            let message = outcome
                .errors
                .iter()
                .map(|(field, msg)| format!("{field}: {msg}"))
                .collect::<Vec<_>>()
                .join("; ");
            JobResult::Failure(message)
        }
    }
}
