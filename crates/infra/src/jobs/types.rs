//! Sync job records and their retry schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use goodstock_core::PackageId;

use crate::sync::SyncAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Last attempt failed; due again at `scheduled_at`.
    Failed { error: String, attempt: u32 },
    /// Out of attempts; parked in the dead-letter queue.
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

/// How the wait between Stockit attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    /// Doubles after every failed attempt.
    #[default]
    Doubling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff: Backoff::Doubling,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Doubling => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// One queued Stockit call for one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub package_id: PackageId,
    pub action: SyncAction,
    /// Stockit id captured at enqueue time, for packages deleted before the job runs.
    pub stockit_id: Option<i64>,
    /// Enqueue order; jobs of one package run strictly in this order.
    pub seq: u64,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the call went through.
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl Job {
    pub fn new(package_id: PackageId, action: SyncAction) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            package_id,
            action,
            stockit_id: None,
            seq: 0,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_stockit_id(mut self, stockit_id: Option<i64>) -> Self {
        self.stockit_id = stockit_id;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| at <= now)
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.scheduled_at = None;
        self.updated_at = now;
        self.record(started_at, now, None);
    }

    /// Record a failed attempt, then either schedule the next one or dead-letter the job.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.record(started_at, now, Some(error.clone()));

        self.status = if self.retry_policy.allows_another(self.attempt) {
            let delay = self.retry_policy.delay_after(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            JobStatus::Failed {
                error,
                attempt: self.attempt,
            }
        } else {
            JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            }
        };
    }

    fn record(&mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>, error: Option<String>) {
        self.history.push(AttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            error,
        });
    }
}

/// What a handler reports back for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff: Backoff::Doubling,
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(64), Duration::from_millis(500));
    }

    #[test]
    fn max_attempts_counts_the_first_try() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));
        assert!(!RetryPolicy::no_retry().allows_another(1));
    }

    #[test]
    fn failing_job_is_rescheduled_then_dead_lettered() {
        let mut job = Job::new(PackageId::new(), SyncAction::Update)
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(10)));

        job.mark_running();
        job.mark_failed("stockit down".to_string(), Utc::now());
        assert!(job.status.is_retriable());
        assert!(!job.is_due(Utc::now() - chrono::Duration::seconds(1)));

        job.mark_running();
        job.mark_failed("stockit down".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(job.history.len(), 2);
        assert!(job.history.iter().all(|h| !h.succeeded()));
    }

    #[test]
    fn completed_job_clears_its_schedule() {
        let mut job = Job::new(PackageId::new(), SyncAction::Move).with_retry_policy(RetryPolicy::fixed(
            3,
            Duration::from_secs(30),
        ));
        job.mark_running();
        job.mark_failed("timeout".into(), Utc::now());
        job.mark_running();
        job.mark_completed(Utc::now());

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.is_due(Utc::now()));
        assert_eq!(job.history.last().map(AttemptRecord::succeeded), Some(true));
    }
}
