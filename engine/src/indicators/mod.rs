// Technical indicators module
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod volume;

pub use atr::Atr;
pub use bollinger::{BollingerBand, BollingerBands};
pub use ema::Ema;
pub use engine::{FillMode, IndicatorEngine};
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{RateOfChange, Stochastic, StochasticOutput};
pub use volume::{ChaikinMoneyFlow, MoneyFlowIndex, OnBalanceVolume};

use serde_json::Value;
use shared::Candle;
use std::collections::HashMap;

// Common trait for all indicators
pub trait IndicatorCalculator: Send + Sync {
    fn name(&self) -> &str;
    fn parameters(&self) -> Value; // Parameters used for this indicator instance
    /// Minimum number of candles before the first defined value.
    fn lookback(&self) -> usize;
    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>>; // None while the lookback is warming up

    /// Same as `calculate`, reusing intermediates other calculators already
    /// stored for the same candles.
    fn calculate_cached(&self, data: &[Candle], _cache: &mut SeriesCache) -> Vec<Option<f64>> {
        self.calculate(data)
    }
}

/// Intermediate series shared between calculators over one candle slice.
/// Keys name the series and its parameters, e.g. `ema_close(12)`.
#[derive(Debug, Default)]
pub struct SeriesCache {
    series: HashMap<String, Vec<Option<f64>>>,
    hits: usize,
}

impl SeriesCache {
    pub fn get_or_insert_with(
        &mut self,
        key: String,
        compute: impl FnOnce(&mut Self) -> Vec<Option<f64>>,
    ) -> Vec<Option<f64>> {
        if let Some(series) = self.series.get(&key) {
            self.hits += 1;
            return series.clone();
        }
        let series = compute(self);
        self.series.insert(key, series.clone());
        series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// EMA of the close, shared by the EMA and MACD calculators.
pub(crate) fn cached_close_ema(data: &[Candle], period: usize, cache: &mut SeriesCache) -> Vec<Option<f64>> {
    cache.get_or_insert_with(format!("ema_close({})", period), |_| {
        let closes: Vec<Option<f64>> = data.iter().map(|c| Some(c.close)).collect();
        ema_of_defined(&closes, period)
    })
}

/// Simple moving average over plain values; `None` until `period` values are seen.
pub(crate) fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || values.len() < period {
        return vec![None; values.len()];
    }
    let mut results = vec![None; period - 1];
    let mut sum: f64 = values.iter().take(period).sum();
    results.push(Some(sum / period as f64));
    for i in period..values.len() {
        sum = sum - values[i - period] + values[i];
        results.push(Some(sum / period as f64));
    }
    results
}

/// Simple moving average over a partially defined series. A window containing
/// any `None` yields `None`.
pub(crate) fn sma_of_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let sum = window.iter().try_fold(0.0, |acc, v| v.map(|x| acc + x))?;
            Some(sum / period as f64)
        })
        .collect()
}

/// Exponential moving average over a partially defined series, seeded with the
/// SMA of the first `period` consecutive defined values.
pub(crate) fn ema_of_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut results = vec![None; values.len()];
    if period == 0 {
        return results;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut previous: Option<f64> = None;
    let mut run: Vec<f64> = Vec::with_capacity(period);

    for (i, value) in values.iter().enumerate() {
        match (previous, value) {
            (Some(prev), Some(v)) => {
                let ema = (v - prev) * multiplier + prev;
                results[i] = Some(ema);
                previous = Some(ema);
            }
            (Some(_), None) => {}
            (None, Some(v)) => {
                run.push(*v);
                if run.len() == period {
                    let seed = run.iter().sum::<f64>() / period as f64;
                    results[i] = Some(seed);
                    previous = Some(seed);
                }
            }
            (None, None) => run.clear(),
        }
    }
    results
}
