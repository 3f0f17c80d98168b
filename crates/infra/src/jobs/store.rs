//! Job storage implementations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;

use goodstock_core::PackageId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
///
/// Jobs of one package are handed out strictly in enqueue order: no job is
/// claimable while an earlier job of the same package is pending, running or
/// waiting to retry. Jobs of different packages are independent.
pub trait SyncJobStore: Send + Sync {
    /// Enqueue a new job; assigns its sequence number.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Store the job's new state. A completed job leaves the store; only the
    /// completion count in [`JobStats`] remembers it.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the next ready job and mark it running.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Non-terminal jobs of one package, in execution order.
    fn pending_for(&self, package_id: PackageId) -> Result<Vec<Job>, JobStoreError>;

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job to the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Requeue a dead-lettered job at the back of its package's queue.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl JobStats {
    /// Jobs still waiting for (another) attempt.
    pub fn outstanding(&self) -> usize {
        self.pending + self.running + self.failed
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("lock poisoned".to_string())
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    next_seq: AtomicU64,
    completed: AtomicUsize,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SyncJobStore for InMemoryJobStore {
    fn enqueue(&self, mut job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        job.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        if job.status == JobStatus::Completed {
            jobs.remove(&job.id);
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            jobs.insert(job.id, job.clone());
        }
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let now = Utc::now();

        let mut open: Vec<&Job> = jobs.values().filter(|j| !j.status.is_terminal()).collect();
        open.sort_by_key(|j| j.seq);

        // Only the head of each package's queue is eligible.
        let mut seen: HashSet<PackageId> = HashSet::new();
        let next = open
            .into_iter()
            .filter(|j| seen.insert(j.package_id))
            .find(|j| matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_due(now))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            let job = jobs.get_mut(&id)?;
            job.mark_running();
            Some(job.clone())
        }))
    }

    fn pending_for(&self, package_id: PackageId) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| j.package_id == package_id && !j.status.is_terminal())
            .cloned()
            .collect();
        result.sort_by_key(|j| j.seq);
        Ok(result)
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| {
                status
                    .as_ref()
                    .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.seq);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(poisoned)?;
        let mut result: Vec<DeadLetterEntry> = dls.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let mut dls = self.dead_letters.write().map_err(poisoned)?;
        dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        Ok(())
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let dls = self.dead_letters.read().map_err(poisoned)?;

        let mut stats = JobStats::default();
        for job in jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.completed += self.completed.load(Ordering::SeqCst);
        stats.dead_lettered += dls.len();
        Ok(stats)
    }
}

impl<S> SyncJobStore for Arc<S>
where
    S: SyncJobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn pending_for(&self, package_id: PackageId) -> Result<Vec<Job>, JobStoreError> {
        (**self).pending_for(package_id)
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
