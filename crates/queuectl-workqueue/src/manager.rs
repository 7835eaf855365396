//! Job lifecycle management.
//!
//! Every state transition is a single [`SharedDocument::transact`] call, so
//! claims, completions, failures, resets and sweeps never interleave.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock;
use crate::dlq;
use crate::error::QueueError;
use crate::job::{DeadLetterEntry, EnqueueOptions, Job, JobState};
use crate::shared::{Commit, SharedDocument};

/// Result of reporting a failed execution.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Budget left; the job is pending again.
    Requeued(Job),
    /// Budget exhausted; the job now lives in the dead-letter collection.
    DeadLettered(DeadLetterEntry),
}

/// Job counts by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Size of the dead-letter collection.
    pub dead: usize,
}

impl QueueStatus {
    pub fn count(&self, state: JobState) -> usize {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }
}

/// Owner of all job state transitions.
pub struct JobManager {
    shared: Arc<SharedDocument>,
    default_max_retries: u32,
}

impl JobManager {
    /// Create a manager. `default_max_retries` applies when neither the
    /// caller nor the persisted config supplies a budget.
    pub fn new(shared: Arc<SharedDocument>, default_max_retries: u32) -> Self {
        Self {
            shared,
            default_max_retries,
        }
    }

    /// The document handle shared with the dead-letter manager.
    pub fn shared(&self) -> &Arc<SharedDocument> {
        &self.shared
    }

    /// Add a new pending job.
    pub async fn enqueue(&self, command: &str, options: EnqueueOptions) -> Result<Job, QueueError> {
        if command.trim().is_empty() {
            return Err(QueueError::validation("command must not be empty"));
        }
        if options.max_retries == Some(0) {
            return Err(QueueError::validation("max_retries must be at least 1"));
        }
        if let Some(id) = options.id.as_deref() {
            if id.trim().is_empty() {
                return Err(QueueError::validation("job id must not be empty"));
            }
        }

        let default_max_retries = self.default_max_retries;
        let job = self
            .shared
            .transact(move |doc| {
                let max_retries = options.max_retries.unwrap_or_else(|| {
                    doc.config
                        .get("maxRetries")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .filter(|n| *n > 0)
                        .unwrap_or(default_max_retries)
                });

                let mut job = Job::new(command, max_retries);
                if let Some(id) = options.id {
                    if doc.contains_id(&id) {
                        return Err(QueueError::validation(format!("job id already exists: {id}")));
                    }
                    job = job.with_id(id);
                }

                doc.jobs.push(job.clone());
                Ok(Commit::Write(job))
            })
            .await?;

        info!(job_id = %job.id, command = %job.command, "Job enqueued");
        Ok(job)
    }

    /// Lease the next job for `worker_id`.
    ///
    /// Oldest pending job first; failing that, the oldest processing job
    /// whose lease is older than `lease_timeout_secs`.
    pub async fn claim(&self, worker_id: &str, lease_timeout_secs: u64) -> Result<Option<Job>, QueueError> {
        self.shared
            .transact(|doc| {
                let now = clock::now();

                let pending = doc
                    .jobs
                    .iter()
                    .enumerate()
                    .filter(|(_, j)| j.state == JobState::Pending && !j.locked)
                    .min_by_key(|(_, j)| j.created_at)
                    .map(|(i, _)| i);

                let index = pending.or_else(|| {
                    doc.jobs
                        .iter()
                        .enumerate()
                        .filter(|(_, j)| {
                            j.state == JobState::Processing
                                && j.locked_at
                                    .is_some_and(|at| clock::lease_expired(at, now, lease_timeout_secs))
                        })
                        .min_by_key(|(_, j)| j.created_at)
                        .map(|(i, _)| i)
                });

                let Some(index) = index else {
                    return Ok(Commit::Discard(None));
                };

                let job = &mut doc.jobs[index];
                if job.state == JobState::Processing {
                    warn!(
                        job_id = %job.id,
                        previous_owner = job.locked_by.as_deref().unwrap_or("unknown"),
                        worker_id,
                        "Reclaiming job with stale lease"
                    );
                }
                job.lease(worker_id, now);
                debug!(job_id = %job.id, worker_id, "Job claimed");
                Ok(Commit::Write(Some(job.clone())))
            })
            .await
    }

    /// Record a successful execution.
    pub async fn complete(&self, job_id: &str, output: impl Into<String>) -> Result<Option<Job>, QueueError> {
        let output = output.into();
        self.shared
            .transact(|doc| {
                let Some(job) = doc.job_mut(job_id) else {
                    warn!(job_id, "Cannot complete unknown job");
                    return Ok(Commit::Discard(None));
                };

                job.state = JobState::Completed;
                job.clear_lock();
                job.output = Some(output);
                job.updated_at = clock::now();
                info!(job_id, "Job completed");
                Ok(Commit::Write(Some(job.clone())))
            })
            .await
    }

    /// Record a failed execution and requeue or dead-letter the job.
    pub async fn fail(&self, job_id: &str, output: impl Into<String>) -> Result<Option<FailOutcome>, QueueError> {
        let output = output.into();
        self.shared
            .transact(|doc| {
                let Some(index) = doc.job_position(job_id) else {
                    warn!(job_id, "Cannot fail unknown job");
                    return Ok(Commit::Discard(None));
                };

                let now = clock::now();
                let job = &mut doc.jobs[index];
                job.attempts += 1;
                job.output = Some(output);
                job.updated_at = now;

                if job.retries_exhausted() {
                    let entry = dlq::bury(doc, index, now);
                    return Ok(Commit::Write(Some(FailOutcome::DeadLettered(entry))));
                }

                job.requeue(now);
                info!(
                    job_id,
                    attempts = job.attempts,
                    max_retries = job.max_retries,
                    "Job failed, requeued"
                );
                Ok(Commit::Write(Some(FailOutcome::Requeued(job.clone()))))
            })
            .await
    }

    /// Force a job back to pending regardless of its attempts.
    pub async fn reset_for_retry(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        self.shared
            .transact(|doc| {
                let Some(job) = doc.job_mut(job_id) else {
                    warn!(job_id, "Cannot reset unknown job");
                    return Ok(Commit::Discard(None));
                };

                job.requeue(clock::now());
                info!(job_id, "Job reset for retry");
                Ok(Commit::Write(Some(job.clone())))
            })
            .await
    }

    /// Return every processing job to pending, whatever its lease age.
    pub async fn reset_all_processing(&self) -> Result<usize, QueueError> {
        let count = self
            .shared
            .transact(|doc| {
                let now = clock::now();
                let mut count = 0;
                for job in doc.jobs.iter_mut().filter(|j| j.is_leased()) {
                    job.requeue(now);
                    count += 1;
                }
                Ok(if count > 0 {
                    Commit::Write(count)
                } else {
                    Commit::Discard(count)
                })
            })
            .await?;

        info!("Reset {} processing job(s)", count);
        Ok(count)
    }

    /// Unlock every job whose lease is older than `timeout_secs`.
    pub async fn reclaim_stale(&self, timeout_secs: u64) -> Result<usize, QueueError> {
        let count = self
            .shared
            .transact(|doc| {
                let now = clock::now();
                let mut count = 0;
                for job in doc.jobs.iter_mut() {
                    let stale = job.is_leased()
                        && job
                            .locked_at
                            .is_some_and(|at| clock::lease_expired(at, now, timeout_secs));
                    if stale {
                        job.requeue(now);
                        count += 1;
                    }
                }
                Ok(if count > 0 {
                    Commit::Write(count)
                } else {
                    Commit::Discard(count)
                })
            })
            .await?;

        info!("Unlocked {} stale job(s)", count);
        Ok(count)
    }

    /// Remove every job and dead-letter entry.
    pub async fn clear_all(&self) -> Result<(), QueueError> {
        self.shared
            .transact(|doc| {
                doc.jobs.clear();
                doc.dlq.clear();
                Ok(Commit::Write(()))
            })
            .await?;

        info!("All jobs cleared");
        Ok(())
    }

    /// Remove a single job from the active collection.
    pub async fn delete(&self, job_id: &str) -> Result<bool, QueueError> {
        self.shared
            .transact(|doc| {
                let Some(index) = doc.job_position(job_id) else {
                    warn!(job_id, "Cannot delete unknown job");
                    return Ok(Commit::Discard(false));
                };
                doc.jobs.remove(index);
                info!(job_id, "Job deleted");
                Ok(Commit::Write(true))
            })
            .await
    }

    /// Look up an active job.
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.shared.snapshot().await?.job(job_id).cloned())
    }

    /// List jobs, optionally by state. `Dead` lists the dead-letter
    /// snapshots.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let document = self.shared.snapshot().await?;
        let jobs = match state {
            Some(JobState::Dead) => document.dlq.into_iter().map(|e| e.job).collect(),
            Some(state) => document.jobs.into_iter().filter(|j| j.state == state).collect(),
            None => document.jobs,
        };
        Ok(jobs)
    }

    /// Counts by state.
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let document = self.shared.snapshot().await?;
        let mut status = QueueStatus {
            dead: document.dlq.len(),
            ..Default::default()
        };

        for job in &document.jobs {
            match job.state {
                JobState::Pending => status.pending += 1,
                JobState::Processing => status.processing += 1,
                JobState::Completed => status.completed += 1,
                JobState::Failed => status.failed += 1,
                JobState::Dead => status.dead += 1,
            }
        }
        status.total = document.jobs.len() + document.dlq.len();

        Ok(status)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
