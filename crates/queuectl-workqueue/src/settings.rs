//! Persisted configuration collection.

use std::sync::Arc;

use queuectl_config::{canonical_key, coerce_value, ConfigError, ConfigValidator, QueueSettings};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::QueueError;
use crate::shared::{Commit, SharedDocument};

/// Reads and writes the `config` collection of the queue document.
pub struct ConfigManager {
    shared: Arc<SharedDocument>,
    base: QueueSettings,
}

impl ConfigManager {
    /// `base` is what the file and environment resolved to; persisted values
    /// are layered on top of it.
    pub fn new(shared: Arc<SharedDocument>, base: QueueSettings) -> Self {
        Self { shared, base }
    }

    /// Effective settings.
    ///
    /// Keys missing from the persisted collection are filled in from the
    /// base settings and written back, so the document always shows the
    /// full configuration in use.
    pub async fn effective(&self) -> Result<QueueSettings, QueueError> {
        let base = self.base.clone();
        self.shared
            .transact(move |doc| {
                let settings = base.with_overrides(&doc.config)?;
                let mut full = settings.to_map()?;
                full.remove("storePath");

                let missing: Vec<String> = full
                    .keys()
                    .filter(|k| !doc.config.contains_key(k.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    return Ok(Commit::Discard(settings));
                }

                for key in missing {
                    if let Some(value) = full.remove(&key) {
                        doc.config.insert(key, value);
                    }
                }
                Ok(Commit::Write(settings))
            })
            .await
    }

    /// Set one key from a raw command-line value and return the persisted
    /// collection.
    pub async fn set(&self, key: &str, raw_value: &str) -> Result<Map<String, Value>, QueueError> {
        let canonical = canonical_key(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        if canonical == "storePath" {
            return Err(ConfigError::InvalidValue {
                field: canonical.to_string(),
                message: "storePath is read from the config file or environment".to_string(),
            }
            .into());
        }
        let value = coerce_value(raw_value);

        let base = self.base.clone();
        let config = self
            .shared
            .transact(move |doc| {
                let mut candidate = doc.config.clone();
                if canonical != key {
                    candidate.remove(key);
                }
                candidate.insert(canonical.to_string(), value);

                let settings = base.with_overrides(&candidate)?;
                ConfigValidator::validate(&settings).into_result()?;

                doc.config = candidate;
                Ok(Commit::Write(doc.config.clone()))
            })
            .await?;

        info!(key = canonical, "Config updated");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryDocumentStore};

    fn manager() -> (Arc<MemoryDocumentStore>, ConfigManager) {
        let store = Arc::new(MemoryDocumentStore::new());
        let shared = Arc::new(SharedDocument::new(store.clone()));
        (store, ConfigManager::new(shared, QueueSettings::default()))
    }

    #[tokio::test]
    async fn test_effective_persists_missing_keys() {
        let (store, config) = manager();
        let settings = config.effective().await.unwrap();
        assert_eq!(settings, QueueSettings::default());

        let document = store.read().await.unwrap();
        assert_eq!(document.config["maxRetries"], Value::from(3));
        assert!(!document.config.contains_key("storePath"));
    }

    #[tokio::test]
    async fn test_set_coerces_and_applies() {
        let (_, config) = manager();
        let persisted = config.set("workerCount", "4").await.unwrap();
        assert_eq!(persisted["workerCount"], Value::from(4));

        let settings = config.effective().await.unwrap();
        assert_eq!(settings.worker_count, 4);
    }

    #[tokio::test]
    async fn test_set_legacy_key_is_canonicalized() {
        let (_, config) = manager();
        let persisted = config.set("jobTimeout", "250").await.unwrap();
        assert_eq!(persisted["jobTimeoutMs"], Value::from(250));
        assert!(!persisted.contains_key("jobTimeout"));
    }

    #[tokio::test]
    async fn test_set_rejects_unknown_key() {
        let (_, config) = manager();
        let result = config.set("colour", "blue").await;
        assert!(matches!(result, Err(QueueError::Config(ConfigError::UnknownKey(_)))));
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_value() {
        let (store, config) = manager();
        assert!(config.set("maxRetries", "0").await.is_err());
        assert!(config.set("workerCount", "lots").await.is_err());
        assert!(store.read().await.unwrap().config.is_empty());
    }

    #[tokio::test]
    async fn test_set_rejects_store_path() {
        let (_, config) = manager();
        assert!(config.set("storePath", "/tmp/x.json").await.is_err());
    }
}
