//! Queue errors.

use thiserror::Error;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Request rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading or writing the document store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid settings.
    #[error("Config error: {0}")]
    Config(#[from] queuectl_config::ConfigError),

    /// Worker pool failure.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl QueueError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = QueueError::validation("command must not be empty");
        assert!(err.to_string().contains("command must not be empty"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: QueueError = io_err.into();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: QueueError = json_err.into();
        assert!(matches!(err, QueueError::Serialization(_)));
    }
}
