//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Queue settings consumed by the job manager and the worker pool.
///
/// Keys are camelCase on the wire so the same names work in the TOML file,
/// in the persisted `config` collection and on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSettings {
    /// Number of polling loops started by `worker start`.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,

    /// Idle sleep between claim attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms", alias = "pollInterval")]
    pub poll_interval_ms: u64,

    /// Per-job execution deadline in milliseconds (0 = disabled).
    #[serde(default, alias = "jobTimeout")]
    pub job_timeout_ms: u64,

    /// Lock age after which a processing job may be reclaimed.
    #[serde(default = "default_lease_timeout_seconds", alias = "claimTimeout")]
    pub lease_timeout_seconds: u64,

    /// Default retry budget for newly enqueued jobs.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Location of the JSON document store.
    #[serde(default = "default_store_path", alias = "dbPath")]
    pub store_path: PathBuf,

    /// Pause after an unexpected error in a worker loop, in milliseconds.
    #[serde(default = "default_error_retry_delay_ms")]
    pub error_retry_delay_ms: u64,
}

fn default_worker_count() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_lease_timeout_seconds() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/db.json")
}

fn default_error_retry_delay_ms() -> u64 {
    2000
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_ms: 0,
            lease_timeout_seconds: default_lease_timeout_seconds(),
            max_retries: default_max_retries(),
            store_path: default_store_path(),
            error_retry_delay_ms: default_error_retry_delay_ms(),
        }
    }
}

/// Canonical key names, in display order.
pub const SETTING_KEYS: &[&str] = &[
    "workerCount",
    "pollIntervalMs",
    "jobTimeoutMs",
    "leaseTimeoutSeconds",
    "maxRetries",
    "storePath",
    "errorRetryDelayMs",
];

/// Map a key (canonical or legacy alias) to its canonical name.
pub fn canonical_key(key: &str) -> Option<&'static str> {
    match key {
        "pollInterval" => Some("pollIntervalMs"),
        "jobTimeout" => Some("jobTimeoutMs"),
        "claimTimeout" => Some("leaseTimeoutSeconds"),
        "dbPath" => Some("storePath"),
        other => SETTING_KEYS.iter().copied().find(|k| *k == other),
    }
}

/// Convert a raw command-line value into a typed JSON value.
///
/// `"true"`/`"false"` become booleans, anything that parses as a number
/// becomes a number, everything else stays a string.
pub fn coerce_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = raw.parse::<u64>() {
        return Value::from(n);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }

    Value::String(raw.to_string())
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Execution deadline, `None` when disabled.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_ms > 0).then(|| Duration::from_millis(self.job_timeout_ms))
    }

    pub fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.error_retry_delay_ms)
    }

    /// Settings as a camelCase JSON object.
    pub fn to_map(&self) -> Result<Map<String, Value>, ConfigError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::Invalid("settings did not serialize to an object".to_string())),
        }
    }

    /// Overlay persisted values on top of these settings.
    ///
    /// Unknown keys are ignored and `storePath` is never taken from the
    /// overlay, since the overlay itself lives inside the store.
    pub fn with_overrides(&self, overrides: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut merged = self.to_map()?;

        for (key, value) in overrides {
            let Some(canonical) = canonical_key(key) else {
                continue;
            };
            if canonical == "storePath" {
                continue;
            }
            merged.insert(canonical.to_string(), value.clone());
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|e| ConfigError::invalid_value("config", e.to_string()))
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
