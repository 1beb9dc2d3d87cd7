use chrono::{DateTime, Utc};
use shared::{ErrorKind, PipelineFailure};
use std::time::Duration;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    // Candle source failures
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited by upstream API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Unexpected response schema: {0}")]
    SchemaError(String),

    // Validation failures
    #[error("Candle series is empty")]
    EmptySeries,

    #[error("Null or non-finite '{field}' value at row {index}")]
    NullValue { index: usize, field: &'static str },

    #[error("Duplicate timestamp {timestamp} at row {index}")]
    DuplicateTimestamp { index: usize, timestamp: DateTime<Utc> },

    #[error("Timestamps not increasing at row {index} ({timestamp})")]
    UnorderedTimestamps { index: usize, timestamp: DateTime<Utc> },

    #[error("Series has {actual} rows, at least {required} required")]
    InsufficientLength { required: usize, actual: usize },

    #[error("Indicator calculation error: {0}")]
    IndicatorComputationError(String),

    #[error("Insufficient data for windowing: {actual} values, more than {window} required")]
    InsufficientDataError { window: usize, actual: usize },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Refresh loop already running for {0}")]
    AlreadyRunning(String),

    #[error("CSV parsing system error: {source}")]
    CsvSystemError {
        #[from]
        source: csv::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Internal processing error: {0}")]
    ProcessingError(String),

    // Catch-all for anyhow errors coming out of the loosely typed data helpers.
    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NetworkError(_) => ErrorKind::Network,
            EngineError::RateLimited { .. } => ErrorKind::RateLimited,
            EngineError::SymbolNotFound(_) => ErrorKind::SymbolNotFound,
            EngineError::SchemaError(_) => ErrorKind::Schema,
            EngineError::EmptySeries => ErrorKind::EmptySeries,
            EngineError::NullValue { .. } => ErrorKind::NullValue,
            EngineError::DuplicateTimestamp { .. } => ErrorKind::DuplicateTimestamp,
            EngineError::UnorderedTimestamps { .. } => ErrorKind::UnorderedTimestamps,
            EngineError::InsufficientLength { .. } => ErrorKind::InsufficientLength,
            EngineError::IndicatorComputationError(_) => ErrorKind::IndicatorComputation,
            EngineError::InsufficientDataError { .. } => ErrorKind::InsufficientData,
            EngineError::TrainingError(_) => ErrorKind::Training,
            EngineError::ExportError(_) => ErrorKind::Export,
            EngineError::ConfigError(_) => ErrorKind::Config,
            EngineError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            EngineError::CsvSystemError { .. } => ErrorKind::Schema,
            EngineError::IoError { .. } => ErrorKind::Io,
            // Only the CSV reader produces anyhow errors.
            EngineError::AnyhowError(_) => ErrorKind::Schema,
            EngineError::ProcessingError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EngineError::RateLimited { .. })
    }
}

impl From<&EngineError> for PipelineFailure {
    fn from(err: &EngineError) -> Self {
        let failure = PipelineFailure::new(err.kind(), err.to_string());
        match err {
            EngineError::RateLimited { retry_after: Some(wait) } => failure.with_retry_after(wait.as_secs()),
            _ => failure,
        }
    }
}

impl From<EngineError> for PipelineFailure {
    fn from(err: EngineError) -> Self {
        PipelineFailure::from(&err)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            EngineError::RateLimited { retry_after: None }
        } else if err.is_decode() {
            EngineError::SchemaError(err.to_string())
        } else {
            EngineError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SchemaError(err.to_string())
    }
}
