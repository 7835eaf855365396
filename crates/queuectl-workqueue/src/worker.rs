//! Worker pool for job execution.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use queuectl_config::QueueSettings;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::executor::JobExecutor;
use crate::job::Job;
use crate::manager::{FailOutcome, JobManager};

/// What happened to a claimed job once its execution was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Completed,
    Requeued { attempts: u32 },
    DeadLettered,
    /// The job was deleted or cleared while it ran.
    Vanished,
}

/// Per-worker counters, returned when a polling loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: String,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

/// A single polling loop.
pub struct Worker {
    id: String,
    manager: Arc<JobManager>,
    executor: JobExecutor,
    poll_interval: Duration,
    error_retry_delay: Duration,
    lease_timeout_secs: u64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Worker {
    /// Create a worker.
    pub fn new(id: impl Into<String>, manager: Arc<JobManager>, settings: &QueueSettings) -> Self {
        Self {
            id: id.into(),
            manager,
            executor: JobExecutor::new(settings.job_timeout()),
            poll_interval: settings.poll_interval(),
            error_retry_delay: settings.error_retry_delay(),
            lease_timeout_secs: settings.lease_timeout_seconds,
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Get completed job count.
    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    /// Get failed job count.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::SeqCst)
    }

    /// Claim and run at most one job.
    ///
    /// Returns `None` when nothing was claimable.
    pub async fn poll_once(&self) -> Result<Option<JobReport>, QueueError> {
        let Some(job) = self.manager.claim(&self.id, self.lease_timeout_secs).await? else {
            return Ok(None);
        };
        self.process(job).await.map(Some)
    }

    /// Execute a claimed job and report its outcome exactly once.
    pub async fn process(&self, job: Job) -> Result<JobReport, QueueError> {
        debug!("Worker {} processing job {}", self.id, job.id);

        let outcome = self.executor.execute(&job.command).await;
        let output = outcome.report();

        if outcome.succeeded() {
            info!(
                worker_id = %self.id,
                job_id = %job.id,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Job succeeded"
            );
            let report = match self.manager.complete(&job.id, output).await? {
                Some(_) => JobReport::Completed,
                None => JobReport::Vanished,
            };
            // Counted only once the outcome is persisted.
            self.jobs_completed.fetch_add(1, Ordering::SeqCst);
            return Ok(report);
        }

        warn!(
            worker_id = %self.id,
            job_id = %job.id,
            completion = ?outcome.completion,
            "Job failed"
        );
        let report = match self.manager.fail(&job.id, output).await? {
            Some(FailOutcome::Requeued(job)) => JobReport::Requeued {
                attempts: job.attempts,
            },
            Some(FailOutcome::DeadLettered(_)) => JobReport::DeadLettered,
            None => JobReport::Vanished,
        };
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        Ok(report)
    }

    /// Poll until `shutdown` fires.
    ///
    /// Cancellation only interrupts the idle and error pauses; a job that
    /// has been claimed always runs to its reported outcome.
    pub async fn run(self, shutdown: CancellationToken) -> WorkerStats {
        info!("Worker {} started", self.id);

        while !shutdown.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => self.poll_interval,
                Err(e) => {
                    error!("Worker {} iteration failed: {}", self.id, e);
                    self.error_retry_delay
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let stats = WorkerStats {
            worker_id: self.id.clone(),
            jobs_completed: self.jobs_completed(),
            jobs_failed: self.jobs_failed(),
        };
        info!(
            worker_id = %stats.worker_id,
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            "Worker stopped"
        );
        stats
    }
}

/// Worker pool lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Stopped = 0,
    Running = 1,
    Stopping = 2,
}

impl From<u8> for PoolState {
    fn from(v: u8) -> Self {
        match v {
            1 => PoolState::Running,
            2 => PoolState::Stopping,
            _ => PoolState::Stopped,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Stopped => write!(f, "stopped"),
            PoolState::Running => write!(f, "running"),
            PoolState::Stopping => write!(f, "stopping"),
        }
    }
}

struct PoolInner {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<WorkerStats>>,
}

/// Owns the polling loops and their lifecycle.
pub struct WorkerPool {
    manager: Arc<JobManager>,
    settings: QueueSettings,
    state: AtomicU8,
    inner: Mutex<PoolInner>,
}

impl WorkerPool {
    /// Create a stopped pool.
    pub fn new(manager: Arc<JobManager>, settings: QueueSettings) -> Self {
        Self {
            manager,
            settings,
            state: AtomicU8::new(PoolState::Stopped as u8),
            inner: Mutex::new(PoolInner {
                shutdown: CancellationToken::new(),
                handles: Vec::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        PoolState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Start `count` polling loops.
    ///
    /// Returns `false` without side effects when the pool is not stopped.
    /// Every processing job is returned to pending before the first loop
    /// starts; whatever held those leases belongs to a previous run.
    pub async fn start(&self, count: u32) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if state != PoolState::Stopped {
            info!("Worker pool is {}, ignoring start", state);
            return Ok(false);
        }
        if count == 0 {
            return Err(QueueError::Worker("worker count must be at least 1".to_string()));
        }

        let reset = self.manager.reset_all_processing().await?;
        if reset > 0 {
            warn!("Returned {} job(s) left processing by a previous run", reset);
        }

        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(count as usize);
        for i in 0..count {
            let worker = Worker::new(format!("worker-{}", i + 1), self.manager.clone(), &self.settings);
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }
        inner.shutdown = shutdown;
        inner.handles = handles;

        self.state.store(PoolState::Running as u8, Ordering::SeqCst);
        info!("Worker pool started with {} workers", count);
        Ok(true)
    }

    /// Signal every loop to stop and wait for all of them to exit.
    ///
    /// Returns `false` without side effects when the pool is not running.
    pub async fn stop(&self) -> bool {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if state != PoolState::Running {
            info!("Worker pool is {}, ignoring stop", state);
            return false;
        }

        self.state.store(PoolState::Stopping as u8, Ordering::SeqCst);
        info!("Worker pool stopping, waiting for in-flight jobs");
        inner.shutdown.cancel();

        let mut completed = 0;
        let mut failed = 0;
        for handle in inner.handles.drain(..) {
            match handle.await {
                Ok(stats) => {
                    completed += stats.jobs_completed;
                    failed += stats.jobs_failed;
                }
                Err(e) => error!("Worker task ended abnormally: {}", e),
            }
        }

        self.state.store(PoolState::Stopped as u8, Ordering::SeqCst);
        info!(completed, failed, "Worker pool stopped");
        true
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
