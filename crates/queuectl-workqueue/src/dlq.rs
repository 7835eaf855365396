//! Dead-letter queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::clock;
use crate::error::QueueError;
use crate::job::{DeadLetterEntry, Job};
use crate::shared::{Commit, SharedDocument};
use crate::store::QueueDocument;

/// Move the active job at `index` into the dead-letter collection.
///
/// Must run inside a transaction; the job leaves `jobs` and enters `dlq` in
/// the same write.
pub(crate) fn bury(document: &mut QueueDocument, index: usize, now: DateTime<Utc>) -> DeadLetterEntry {
    let job = document.jobs.remove(index);
    let entry = DeadLetterEntry::bury(job, now);
    document.dlq.push(entry.clone());
    info!(
        job_id = %entry.job.id,
        attempts = entry.job.attempts,
        "Job moved to dead letter queue"
    );
    entry
}

/// Operator access to dead-lettered jobs.
pub struct DeadLetterManager {
    shared: Arc<SharedDocument>,
}

impl DeadLetterManager {
    pub fn new(shared: Arc<SharedDocument>) -> Self {
        Self { shared }
    }

    /// All dead-letter entries, oldest first.
    pub async fn list(&self) -> Result<Vec<DeadLetterEntry>, QueueError> {
        Ok(self.shared.snapshot().await?.dlq)
    }

    /// Re-admit a dead-lettered job with a fresh retry budget.
    ///
    /// Returns `None` when no entry has that ID.
    pub async fn retry(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        self.shared
            .transact(|doc| {
                let Some(index) = doc.dead_letter_position(job_id) else {
                    warn!(job_id, "Dead letter entry not found");
                    return Ok(Commit::Discard(None));
                };
                if doc.job_position(job_id).is_some() {
                    return Err(QueueError::validation(format!(
                        "job {job_id} already exists in the active queue"
                    )));
                }

                let job = doc.dlq.remove(index).revive(clock::now());
                doc.jobs.push(job.clone());
                info!(job_id, "Dead letter job requeued");
                Ok(Commit::Write(Some(job)))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use crate::store::{DocumentStore, MemoryDocumentStore};

    fn seeded(entries: Vec<DeadLetterEntry>) -> (Arc<MemoryDocumentStore>, DeadLetterManager) {
        let document = QueueDocument {
            dlq: entries,
            ..Default::default()
        };
        let store = Arc::new(MemoryDocumentStore::with_document(document));
        let shared = Arc::new(SharedDocument::new(store.clone()));
        (store, DeadLetterManager::new(shared))
    }

    fn dead(id: &str, attempts: u32) -> DeadLetterEntry {
        let mut job = Job::new("false", attempts).with_id(id);
        job.attempts = attempts;
        job.output = Some("boom".to_string());
        DeadLetterEntry::bury(job, clock::now())
    }

    #[tokio::test]
    async fn test_list() {
        let (_, dlq) = seeded(vec![dead("a", 3), dead("b", 3)]);
        let entries = dlq.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job.id, "a");
    }

    #[tokio::test]
    async fn test_retry_moves_job_back() {
        let (store, dlq) = seeded(vec![dead("a", 3)]);

        let job = dlq.retry("a").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(!job.locked);
        assert_eq!(job.output.as_deref(), Some("boom"));

        let document = store.read().await.unwrap();
        assert!(document.dlq.is_empty());
        assert_eq!(document.jobs.len(), 1);
        assert_eq!(document.jobs[0].id, "a");
    }

    #[tokio::test]
    async fn test_retry_unknown_is_none() {
        let (store, dlq) = seeded(vec![dead("a", 3)]);
        assert!(dlq.retry("zzz").await.unwrap().is_none());
        assert_eq!(store.read().await.unwrap().dlq.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_rejects_id_collision() {
        let (store, dlq) = seeded(vec![dead("a", 3)]);
        let mut document = store.read().await.unwrap();
        document.jobs.push(Job::new("true", 3).with_id("a"));
        store.write(&document).await.unwrap();

        let result = dlq.retry("a").await;
        assert!(matches!(result, Err(QueueError::Validation(_))));
        assert_eq!(store.read().await.unwrap().dlq.len(), 1);
    }

    #[test]
    fn test_bury_is_exclusive() {
        let mut document = QueueDocument::default();
        document.jobs.push(Job::new("false", 1).with_id("x"));

        let entry = bury(&mut document, 0, clock::now());
        assert_eq!(entry.job.state, JobState::Dead);
        assert!(document.jobs.is_empty());
        assert_eq!(document.dlq.len(), 1);
    }
}
