//! Document persistence.
//!
//! The whole queue lives in one JSON document:
//!
//! ```text
//! {
//!   "jobs":   [Job, ...],             // active collection, insertion order
//!   "dlq":    [DeadLetterEntry, ...], // dead-letter collection
//!   "config": { "maxRetries": 3, ... }
//! }
//! ```
//!
//! Stores only read and write whole snapshots. They provide no locking;
//! callers serialize access through [`SharedDocument`](crate::SharedDocument).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::QueueError;
use crate::job::{DeadLetterEntry, Job};

/// Snapshot of the persisted queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub dlq: Vec<DeadLetterEntry>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl QueueDocument {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn job_position(&self, id: &str) -> Option<usize> {
        self.jobs.iter().position(|j| j.id == id)
    }

    pub fn dead_letter_position(&self, id: &str) -> Option<usize> {
        self.dlq.iter().position(|e| e.job.id == id)
    }

    /// Check whether `id` is taken in either collection.
    pub fn contains_id(&self, id: &str) -> bool {
        self.job_position(id).is_some() || self.dead_letter_position(id).is_some()
    }
}

/// Whole-document store contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the current snapshot.
    async fn read(&self) -> Result<QueueDocument, QueueError>;

    /// Persist a snapshot, replacing the previous one.
    async fn write(&self, document: &QueueDocument) -> Result<(), QueueError>;
}

/// In-memory document store for testing.
pub struct MemoryDocumentStore {
    document: RwLock<QueueDocument>,
}

impl MemoryDocumentStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Self::with_document(QueueDocument::default())
    }

    /// Create a memory store seeded with a document.
    pub fn with_document(document: QueueDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self) -> Result<QueueDocument, QueueError> {
        Ok(self.document.read().await.clone())
    }

    async fn write(&self, document: &QueueDocument) -> Result<(), QueueError> {
        *self.document.write().await = document.clone();
        Ok(())
    }
}

/// JSON file document store.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
pub struct FileDocumentStore {
    path: PathBuf,
}

impl FileDocumentStore {
    /// Open a file store, creating the parent directory if needed.
    ///
    /// The file itself is created on first write; until then reads return
    /// an empty document.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                QueueError::Store(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        debug!("FileDocumentStore initialized at {:?}", path);
        Ok(Self { path })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn read(&self) -> Result<QueueDocument, QueueError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(QueueDocument::default());
            }
            Err(e) => {
                return Err(QueueError::Store(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(QueueDocument::default());
        }

        let document: QueueDocument = serde_json::from_str(&content)?;
        Ok(document)
    }

    async fn write(&self, document: &QueueDocument) -> Result<(), QueueError> {
        let content = serde_json::to_string_pretty(document)?;
        let temp = self.temp_path();

        fs::write(&temp, content).await.map_err(|e| {
            QueueError::Store(format!("Failed to write {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).await.map_err(|e| {
            QueueError::Store(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!(
            jobs = document.jobs.len(),
            dlq = document.dlq.len(),
            "Wrote queue document to {:?}",
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
