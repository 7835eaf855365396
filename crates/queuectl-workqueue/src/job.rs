//! Job definition and state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Job state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed.
    #[default]
    Pending,
    /// Claimed by a worker and leased.
    Processing,
    /// Finished with exit code 0.
    Completed,
    /// Failed (kept for listing compatibility; failures normally requeue).
    Failed,
    /// Retry budget exhausted; only found in the dead-letter collection.
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| QueueError::validation(format!("unknown job state: {s}")))
    }
}

/// A shell-command job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: String,
    /// Shell command to run.
    pub command: String,
    /// Current state.
    #[serde(default)]
    pub state: JobState,
    /// Number of failed executions.
    #[serde(default)]
    pub attempts: u32,
    /// Retry budget captured at creation time.
    pub max_retries: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    /// Combined stdout/stderr of the last execution.
    #[serde(default)]
    pub output: Option<String>,
}

impl Job {
    /// Create a new pending job with a random ID.
    pub fn new(command: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            locked: false,
            locked_by: None,
            locked_at: None,
            output: None,
        }
    }

    /// Set an explicit job ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Check whether the job currently holds a lease.
    pub fn is_leased(&self) -> bool {
        self.state == JobState::Processing || self.locked
    }

    /// Check whether another failure would exhaust the retry budget.
    pub fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }

    /// Take the lease for `worker_id`.
    pub(crate) fn lease(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.state = JobState::Processing;
        self.locked = true;
        self.locked_by = Some(worker_id.to_string());
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    /// Drop any lease without touching the state.
    pub(crate) fn clear_lock(&mut self) {
        self.locked = false;
        self.locked_by = None;
        self.locked_at = None;
    }

    /// Return the job to the claimable pool.
    pub(crate) fn requeue(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.clear_lock();
        self.updated_at = now;
    }
}

/// Caller-supplied overrides for `enqueue`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Explicit job ID (a UUID is generated when absent).
    #[serde(default)]
    pub id: Option<String>,
    /// Retry budget (the configured default when absent).
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// A job that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    #[serde(flatten)]
    pub job: Job,
    pub dead_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub(crate) fn bury(mut job: Job, now: DateTime<Utc>) -> Self {
        job.state = JobState::Dead;
        job.clear_lock();
        Self { job, dead_at: now }
    }

    /// Turn the entry back into a fresh pending job.
    pub(crate) fn revive(self, now: DateTime<Utc>) -> Job {
        let mut job = self.job;
        job.attempts = 0;
        job.requeue(now);
        job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new() {
        let job = Job::new("echo hi", 3);
        assert_eq!(job.command, "echo hi");
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(!job.locked);
        assert!(job.output.is_none());
        assert!(Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_with_id() {
        let job = Job::new("true", 1).with_id("job1");
        assert_eq!(job.id, "job1");
    }

    #[test]
    fn test_state_round_trips_as_lowercase() {
        assert_eq!(serde_json::to_string(&JobState::Processing).unwrap(), "\"processing\"");
        assert_eq!("DEAD".parse::<JobState>().unwrap(), JobState::Dead);
        assert!("sleeping".parse::<JobState>().is_err());
    }

    #[test]
    fn test_missing_state_defaults_to_pending() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "legacy",
            "command": "true",
            "max_retries": 3,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(JobState::default(), JobState::Pending);
    }

    #[test]
    fn test_lease_and_requeue() {
        let mut job = Job::new("true", 3);
        let now = Utc::now();

        job.lease("worker-1", now);
        assert_eq!(job.state, JobState::Processing);
        assert!(job.is_leased());
        assert_eq!(job.locked_by.as_deref(), Some("worker-1"));
        assert_eq!(job.locked_at, Some(now));

        job.requeue(now);
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.is_leased());
        assert!(job.locked_by.is_none());
        assert!(job.locked_at.is_none());
    }

    #[test]
    fn test_retries_exhausted() {
        let mut job = Job::new("false", 2);
        assert!(!job.retries_exhausted());
        job.attempts = 2;
        assert!(job.retries_exhausted());
    }

    #[test]
    fn test_dead_letter_entry_flattens_job() {
        let mut job = Job::new("false", 1);
        job.lease("worker-1", Utc::now());
        let entry = DeadLetterEntry::bury(job, Utc::now());

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["state"], "dead");
        assert_eq!(value["locked"], false);
        assert!(value.get("dead_at").is_some());
        assert!(value.get("job").is_none());
    }

    #[test]
    fn test_revive_resets_attempts() {
        let mut job = Job::new("false", 2);
        job.attempts = 2;
        let revived = DeadLetterEntry::bury(job, Utc::now()).revive(Utc::now());
        assert_eq!(revived.attempts, 0);
        assert_eq!(revived.state, JobState::Pending);
        assert!(!revived.locked);
    }
}
