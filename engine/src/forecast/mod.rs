// Sequence forecasting: scaling/windowing, the LSTM network and on-demand training.
pub mod lstm;
pub mod model;
pub mod window;

pub use model::{ForecastModel, TrainedModel};
pub use window::{build_windows, ScalerState, Window};

use serde::Serialize;
use shared::FeatureRow;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::ModelConfig;
use crate::error::{EngineError, EngineResult};

/// Serialises training against refresh fetches: training holds the write
/// side for its whole run, every fetch takes the read side first.
#[derive(Debug, Clone, Default)]
pub struct TrainingGate {
    lock: Arc<RwLock<()>>,
}

impl TrainingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no training run is active.
    pub async fn fetch_permit(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Held for the duration of a training run.
    pub async fn training_permit(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }

    pub fn is_training(&self) -> bool {
        self.lock.try_read().is_err()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub predicted_close: f64,
    pub last_close: f64,
    /// Per-epoch training loss in scaled units.
    pub loss_history: Vec<f64>,
    pub windows: usize,
}

/// Trains a fresh model on a feature series and predicts the close after it.
#[derive(Debug, Clone)]
pub struct Forecaster {
    config: ModelConfig,
    gate: TrainingGate,
}

impl Forecaster {
    pub fn new(config: ModelConfig, gate: TrainingGate) -> Self {
        Self { config, gate }
    }

    /// Blocking: windows the close column, fits, and predicts from the last
    /// `window_size` closes.
    pub fn forecast_blocking(config: &ModelConfig, features: &[FeatureRow]) -> EngineResult<ForecastReport> {
        let closes: Vec<f64> = features.iter().map(FeatureRow::close).collect();
        let (scaler, windows) = build_windows(&closes, config.window_size)?;
        let model = ForecastModel::new(config.clone()).fit(&windows)?;

        let last_input = scaler.scale_all(&closes[closes.len() - config.window_size..]);
        let predicted_close = model.predict_price(&scaler, &last_input)?;
        let last_close = closes[closes.len() - 1];

        Ok(ForecastReport {
            predicted_close,
            last_close,
            loss_history: model.loss_history().to_vec(),
            windows: windows.len(),
        })
    }

    /// Runs training on the blocking pool while holding the training gate.
    pub async fn forecast_next(&self, features: Vec<FeatureRow>) -> EngineResult<ForecastReport> {
        let _training = self.gate.training_permit().await;
        let config = self.config.clone();
        tracing::info!(rows = features.len(), window_size = config.window_size, "Starting on-demand training");

        let report = tokio::task::spawn_blocking(move || Self::forecast_blocking(&config, &features))
            .await
            .map_err(|e| EngineError::ProcessingError(format!("training task failed: {}", e)))??;

        tracing::info!(
            predicted_close = report.predicted_close,
            last_close = report.last_close,
            final_loss = report.loss_history.last().copied().unwrap_or_default(),
            "Forecast ready"
        );
        Ok(report)
    }
}
