use thiserror::Error;

/// Coarse classification of a failure, used in log lines and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NetworkTimeout,
    NetworkError,
    ParseError,
    MappingError,
    WriteError,
    ConfigError,
    ValidationError,
    SchedulingError,
    Io,
}

#[derive(Error, Debug)]
pub enum StockWatchError {
    #[error("Network timeout fetching {url}")]
    NetworkTimeout { url: String },

    #[error("Network error fetching {url}: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("JSON parsing error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Mapping error on field '{field}': {reason}")]
    MappingError { field: String, reason: String },

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Scheduling error: {0}")]
    SchedulingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),
}

impl StockWatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StockWatchError::NetworkTimeout { .. } => FailureKind::NetworkTimeout,
            StockWatchError::NetworkError { .. } => FailureKind::NetworkError,
            StockWatchError::ParseError(_) => FailureKind::ParseError,
            StockWatchError::MappingError { .. } => FailureKind::MappingError,
            StockWatchError::WriteError(_) => FailureKind::WriteError,
            StockWatchError::ConfigError(_) => FailureKind::ConfigError,
            StockWatchError::ValidationError(_) => FailureKind::ValidationError,
            StockWatchError::SchedulingError(_) => FailureKind::SchedulingError,
            StockWatchError::IoError(_) | StockWatchError::ArrowError(_) => FailureKind::Io,
        }
    }

    pub(crate) fn mapping(field: &str, reason: impl Into<String>) -> Self {
        StockWatchError::MappingError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StockWatchError>;

impl From<tokio_cron_scheduler::JobSchedulerError> for StockWatchError {
    fn from(e: tokio_cron_scheduler::JobSchedulerError) -> Self {
        StockWatchError::SchedulingError(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for StockWatchError {
    fn from(e: arrow::error::ArrowError) -> Self {
        StockWatchError::ArrowError(e.to_string())
    }
}
