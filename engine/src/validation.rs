// Candle series validation gate. Indicators only accept a `ValidatedSeries`.
use shared::Candle;
use std::collections::HashSet;
use std::ops::Deref;

use crate::error::{EngineError, EngineResult};

/// Rows needed before indicator output is considered stable.
pub const MIN_SERIES_LEN: usize = 50;

/// A candle series that passed [`validate`]. Read-only; only this module can build one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSeries {
    candles: Vec<Candle>,
}

impl ValidatedSeries {
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn latest_close(&self) -> f64 {
        // Non-empty by construction.
        self.candles.last().map(|c| c.close).unwrap_or_default()
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

impl Deref for ValidatedSeries {
    type Target = [Candle];

    fn deref(&self) -> &Self::Target {
        &self.candles
    }
}

pub fn validate(candles: Vec<Candle>) -> EngineResult<ValidatedSeries> {
    validate_with_min_len(candles, MIN_SERIES_LEN)
}

/// Checks run in order: empty, null/NaN fields, duplicate timestamps,
/// ordering, then length.
pub fn validate_with_min_len(candles: Vec<Candle>, min_len: usize) -> EngineResult<ValidatedSeries> {
    if candles.is_empty() {
        tracing::warn!("Rejecting empty candle series");
        return Err(EngineError::EmptySeries);
    }

    for (index, candle) in candles.iter().enumerate() {
        if let Some((field, _)) = candle.ohlcv().into_iter().find(|(_, v)| !v.is_finite()) {
            tracing::warn!(index, field, "Candle series contains a null value");
            return Err(EngineError::NullValue { index, field });
        }
    }

    let mut seen = HashSet::with_capacity(candles.len());
    for (index, candle) in candles.iter().enumerate() {
        if !seen.insert(candle.timestamp) {
            tracing::warn!(index, timestamp = %candle.timestamp, "Candle series contains duplicate timestamps");
            return Err(EngineError::DuplicateTimestamp { index, timestamp: candle.timestamp });
        }
    }

    if let Some(index) = candles.windows(2).position(|pair| pair[1].timestamp <= pair[0].timestamp) {
        let timestamp = candles[index + 1].timestamp;
        tracing::warn!(index = index + 1, %timestamp, "Candle timestamps are not increasing");
        return Err(EngineError::UnorderedTimestamps { index: index + 1, timestamp });
    }

    if candles.len() < min_len {
        tracing::warn!(rows = candles.len(), required = min_len, "Candle series too short");
        return Err(EngineError::InsufficientLength { required: min_len, actual: candles.len() });
    }

    tracing::debug!(rows = candles.len(), "Candle series validated");
    Ok(ValidatedSeries { candles })
}
