use std::time::Duration;

/// Errors surfaced to callers of the verdict pipeline and notification store.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VerdictError {
    #[error("Invalid message: {0}")]
    Validation(String),
    #[error("Notification not found: {0}")]
    NotFound(String),
}

/// Why a signal source produced no usable output.
///
/// These never escape the pipeline; the evidence builder downgrades them to
/// zero-score, unavailable evidence.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AdapterFailure {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("failed: {0}")]
    Failed(String),
    #[error("malformed output: {0}")]
    Malformed(String),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
