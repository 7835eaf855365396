//! Configuration loader.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::schema::QueueSettings;

/// Environment variables recognised as overrides, with the setting they feed.
const ENV_KEYS: &[(&str, &str)] = &[
    ("WORKER_COUNT", "workerCount"),
    ("POLL_INTERVAL", "pollIntervalMs"),
    ("QUEUE_POLL_INTERVAL", "pollIntervalMs"),
    ("JOB_TIMEOUT", "jobTimeoutMs"),
    ("LEASE_TIMEOUT", "leaseTimeoutSeconds"),
    ("MAX_RETRIES", "maxRetries"),
    ("ERROR_RETRY_DELAY", "errorRetryDelayMs"),
    ("DB_PATH", "storePath"),
    ("QUEUECTL_DB_FILE", "storePath"),
];

/// A snapshot of the environment variables that override settings.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Capture the relevant variables from the process environment.
    pub fn from_env() -> Self {
        let vars = ENV_KEYS
            .iter()
            .filter_map(|(name, _)| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Build overrides from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Apply the captured variables. Later entries in the key table win.
    pub fn apply(&self, settings: &mut QueueSettings) -> Result<(), ConfigError> {
        for (name, key) in ENV_KEYS {
            let Some(raw) = self.vars.get(*name) else {
                continue;
            };
            let raw = raw.trim();
            match *key {
                "workerCount" => settings.worker_count = parse(name, raw)?,
                "pollIntervalMs" => settings.poll_interval_ms = parse(name, raw)?,
                "jobTimeoutMs" => settings.job_timeout_ms = parse(name, raw)?,
                "leaseTimeoutSeconds" => settings.lease_timeout_seconds = parse(name, raw)?,
                "maxRetries" => settings.max_retries = parse(name, raw)?,
                "errorRetryDelayMs" => settings.error_retry_delay_ms = parse(name, raw)?,
                "storePath" => settings.store_path = PathBuf::from(raw),
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid_value(name, format!("{raw:?}: {e}")))
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<QueueSettings, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load settings from a TOML string.
    pub fn load_str(content: &str) -> Result<QueueSettings, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let settings: QueueSettings = toml::from_str(&expanded)?;
        Ok(settings)
    }

    /// Resolve settings from defaults, an optional file and the environment.
    ///
    /// A missing file is not an error; the defaults are used instead.
    pub fn resolve(path: Option<&Path>, env: &EnvOverrides) -> Result<QueueSettings, ConfigError> {
        let mut settings = match path {
            Some(path) if path.exists() => Self::load(path)?,
            _ => QueueSettings::default(),
        };

        env.apply(&mut settings)?;

        let store_path = settings.store_path.to_string_lossy().into_owned();
        settings.store_path = PathBuf::from(Self::expand_path(&store_path));

        Ok(settings)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.queuectl/db.json`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
