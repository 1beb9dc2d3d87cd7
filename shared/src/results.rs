// Pipeline outputs handed to presentation and export collaborators.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{Candle, FeatureField, FeatureRow, Interval};

/// Classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    RateLimited,
    SymbolNotFound,
    Schema,
    EmptySeries,
    NullValue,
    DuplicateTimestamp,
    UnorderedTimestamps,
    InsufficientLength,
    IndicatorComputation,
    InsufficientData,
    Training,
    Export,
    Config,
    Io,
    AlreadyRunning,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cloneable failure marker carried inside results and published state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Upstream hint for how long to wait before the next request.
    #[serde(default)]
    pub retry_after_secs: Option<u64>,
}

impl PipelineFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one pipeline pass for a single interval.
///
/// `current_price` is always the latest close of *this* interval's series;
/// it is `None` only when the run failed before candles were available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub interval: Interval,
    pub features: Vec<FeatureRow>,
    pub current_price: Option<f64>,
    pub error: Option<PipelineFailure>,
}

impl PipelineResult {
    pub fn success(interval: Interval, features: Vec<FeatureRow>, current_price: f64) -> Self {
        Self {
            interval,
            features,
            current_price: Some(current_price),
            error: None,
        }
    }

    pub fn failure(interval: Interval, error: PipelineFailure) -> Self {
        Self {
            interval,
            features: Vec::new(),
            current_price: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A named line drawn over the candle chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Everything a chart renderer needs; the renderer itself lives outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub candles: Vec<Candle>,
    pub overlays: Vec<OverlaySeries>,
}

impl ChartSpec {
    pub fn from_features(rows: &[FeatureRow], overlay_fields: &[FeatureField]) -> Self {
        let overlays = overlay_fields
            .iter()
            .map(|field| OverlaySeries {
                name: field.column_name().to_string(),
                values: rows.iter().map(|row| row.get(*field)).collect(),
            })
            .collect();
        Self {
            candles: rows.iter().map(|row| row.candle.clone()).collect(),
            overlays,
        }
    }
}

/// Payload delivered to the presentation layer for one successful interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationUpdate {
    pub interval: Interval,
    pub current_price: f64,
    pub features: Vec<FeatureRow>,
    pub chart: ChartSpec,
}

impl PresentationUpdate {
    /// Returns `None` for failed results, which carry no data to draw.
    pub fn from_result(result: &PipelineResult, overlay_fields: &[FeatureField]) -> Option<Self> {
        let current_price = result.current_price?;
        if result.error.is_some() {
            return None;
        }
        Some(Self {
            interval: result.interval,
            current_price,
            features: result.features.clone(),
            chart: ChartSpec::from_features(&result.features, overlay_fields),
        })
    }
}

/// Refresh loop lifecycle: `Idle -> Running -> (Stopped | Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshStatus {
    Idle,
    Running,
    Stopped,
    Cancelled,
}

impl RefreshStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshStatus::Stopped | RefreshStatus::Cancelled)
    }
}

/// Snapshot of one refresh loop, replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub symbol: String,
    pub interval: Interval,
    pub status: RefreshStatus,
    pub cycle: u64,
    pub last_result: Option<PipelineResult>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn idle(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            symbol: symbol.into(),
            interval,
            status: RefreshStatus::Idle,
            cycle: 0,
            last_result: None,
            updated_at: Utc::now(),
        }
    }

    /// Next state with a new status, keeping the last published result.
    pub fn with_status(&self, status: RefreshStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Next state after a completed cycle.
    pub fn with_result(&self, cycle: u64, result: PipelineResult) -> Self {
        Self {
            cycle,
            last_result: Some(result),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}
