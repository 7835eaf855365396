//! Serialized access to the queue document.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::QueueError;
use crate::store::{DocumentStore, QueueDocument};

/// What a transaction wants done with the mutated document.
pub(crate) enum Commit<T> {
    /// Persist the document, then return the value.
    Write(T),
    /// Leave the store untouched.
    Discard(T),
}

/// A document store paired with the single lock that guards every mutation.
///
/// All state changes go through [`SharedDocument::transact`], which holds
/// the lock across read, mutation and write. Nothing else in the crate
/// writes the store.
pub struct SharedDocument {
    store: Arc<dyn DocumentStore>,
    lock: Mutex<()>,
}

impl SharedDocument {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Read the current snapshot without taking the mutation lock.
    pub async fn snapshot(&self) -> Result<QueueDocument, QueueError> {
        self.store.read().await
    }

    /// Run `mutate` as one critical section over the whole document.
    pub(crate) async fn transact<T, F>(&self, mutate: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut QueueDocument) -> Result<Commit<T>, QueueError>,
    {
        let _guard = self.lock.lock().await;

        let mut document = self.store.read().await?;
        match mutate(&mut document)? {
            Commit::Write(value) => {
                self.store.write(&document).await?;
                Ok(value)
            }
            Commit::Discard(value) => {
                debug!("Transaction made no changes, skipping write");
                Ok(value)
            }
        }
    }
}
