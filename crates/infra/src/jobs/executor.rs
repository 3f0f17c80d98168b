//! Background thread that drains queued sync jobs.

use std::io;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::SyncJobStore;
use super::types::{Job, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs
    pub poll_interval: Duration,
    /// Name for logging and the thread
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "stockit-sync".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, result: &Result<(), String>, job: &Job) {
        self.jobs_processed += 1;
        match result {
            Ok(()) => self.jobs_succeeded += 1,
            Err(_) => {
                self.jobs_failed += 1;
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    self.jobs_dead_lettered += 1;
                }
            }
        }
    }
}

/// Background job executor.
///
/// Polls a job store for ready jobs, runs them through the handler and
/// handles retries and dead-lettering.
pub struct JobExecutor<S: SyncJobStore> {
    store: S,
    handler: JobHandler,
}

impl<S: SyncJobStore + 'static> JobExecutor<S> {
    pub fn new<F>(store: S, handler: F) -> Self
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        Self {
            store,
            handler: Box::new(handler),
        }
    }

    /// Spawn the executor in a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || executor_loop(self, config, shutdown_rx, stats_clone))?;

        Ok(JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    /// Run every job that is ready now, on the calling thread. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Ok(Some(mut job)) = self.store.claim_next() {
            let _ = self.execute(&mut job);
            ran += 1;
        }
        ran
    }

    /// Run one claimed job and persist what happened to it.
    pub fn execute(&self, job: &mut Job) -> Result<(), String> {
        let started = Utc::now();
        let result = (self.handler)(job);

        let failure = match result {
            JobResult::Success => {
                job.mark_completed(started);
                None
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                Some(error)
            }
        };
        self.store.update(job).map_err(|e| e.to_string())?;

        let Some(error) = failure else {
            debug!(job_id = %job.id, package_id = %job.package_id, action = %job.action, "job completed");
            return Ok(());
        };
        if let JobStatus::DeadLettered { attempts, .. } = job.status {
            warn!(
                job_id = %job.id,
                package_id = %job.package_id,
                action = %job.action,
                attempts,
                error = %error,
                "sync job dead-lettered"
            );
            self.store
                .dead_letter(job.clone(), error.clone())
                .map_err(|e| e.to_string())?;
        }
        Err(error)
    }
}

fn executor_loop<S: SyncJobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, action = %job.action, "claimed job");
                let result = executor.execute(&mut job);
                if let Ok(mut s) = stats.lock() {
                    s.record(&result, &job);
                }
                if let Err(e) = result {
                    debug!(
                        executor = %config.name,
                        job_id = %job.id,
                        error = %e,
                        status = ?job.status,
                        "job execution failed"
                    );
                }
            }
            Ok(None) => {
                // Wake early on shutdown instead of sleeping the full interval.
                if shutdown_rx.recv_timeout(config.poll_interval).is_ok() {
                    break;
                }
            }
            Err(e) => {
                error!(executor = %config.name, error = ?e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}
