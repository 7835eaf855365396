//! # queuectl work queue
//!
//! Persisted shell-command job queue.
//!
//! ## Features
//!
//! - FIFO claiming with lease expiry and stale-lease reclamation
//! - Worker pool with per-job timeouts
//! - Retry budget with a dead letter queue
//! - JSON document persistence with atomic replacement

mod clock;
pub mod dlq;
pub mod error;
pub mod executor;
pub mod job;
pub mod manager;
pub mod settings;
pub mod shared;
pub mod store;
pub mod worker;

pub use dlq::DeadLetterManager;
pub use error::QueueError;
pub use executor::{Completion, ExecutionOutcome, JobExecutor};
pub use job::{DeadLetterEntry, EnqueueOptions, Job, JobState};
pub use manager::{FailOutcome, JobManager, QueueStatus};
pub use settings::ConfigManager;
pub use shared::SharedDocument;
pub use store::{DocumentStore, FileDocumentStore, MemoryDocumentStore, QueueDocument};
pub use worker::{JobReport, PoolState, Worker, WorkerPool, WorkerStats};
