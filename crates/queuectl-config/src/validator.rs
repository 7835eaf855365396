//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::QueueSettings;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn accumulated errors into a single `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.is_valid() {
            return Ok(self.warnings);
        }
        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid(message))
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the settings.
    pub fn validate(settings: &QueueSettings) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_workers(settings, &mut result);
        Self::validate_timing(settings, &mut result);
        Self::validate_retries(settings, &mut result);

        if settings.store_path.as_os_str().is_empty() {
            result.add_error(ValidationError::new("storePath", "storePath cannot be empty"));
        }

        result
    }

    fn validate_workers(settings: &QueueSettings, result: &mut ValidationResult) {
        if settings.worker_count == 0 {
            result.add_error(ValidationError::new(
                "workerCount",
                "workerCount must be at least 1",
            ));
        }

        if settings.worker_count > 256 {
            result.add_warning(ValidationWarning::new(
                "workerCount",
                "workerCount is very high (>256), each worker may run a subprocess",
            ));
        }
    }

    fn validate_timing(settings: &QueueSettings, result: &mut ValidationResult) {
        if settings.lease_timeout_seconds == 0 {
            result.add_error(ValidationError::new(
                "leaseTimeoutSeconds",
                "leaseTimeoutSeconds must be greater than 0",
            ));
        }

        if settings.poll_interval_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "pollIntervalMs",
                "pollIntervalMs is 0, idle workers will poll the store continuously",
            ));
        }

        // A lease shorter than the job deadline lets another worker steal a
        // job that is still legitimately running.
        if settings.job_timeout_ms > 0
            && settings.job_timeout_ms / 1000 >= settings.lease_timeout_seconds
        {
            result.add_warning(ValidationWarning::new(
                "leaseTimeoutSeconds",
                "leaseTimeoutSeconds does not exceed jobTimeoutMs, running jobs may be reclaimed",
            ));
        }
    }

    fn validate_retries(settings: &QueueSettings, result: &mut ValidationResult) {
        if settings.max_retries == 0 {
            result.add_error(ValidationError::new(
                "maxRetries",
                "maxRetries must be at least 1",
            ));
        }
    }
}
