// Min-max scaling and sliding-window construction for sequence learning.
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Frozen min-max scaler for one training run.
///
/// Known limitation: the scaler is fit over the entire close series, including
/// the values later used as prediction targets, so the target range leaks
/// into the normalised inputs. This is kept as-is because forecast behaviour
/// depends on it; fitting on the input portion only would change outputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub min: f64,
    pub max: f64,
}

impl ScalerState {
    pub fn fit(prices: &[f64]) -> EngineResult<Self> {
        if prices.is_empty() {
            return Err(EngineError::InsufficientDataError { window: 0, actual: 0 });
        }
        let (min, max) = prices
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Ok(Self { min, max })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Scales into `[0, 1]`; a constant series (`max == min`) maps to 0.
    pub fn scale(&self, price: f64) -> f64 {
        let range = self.range();
        if range == 0.0 {
            0.0
        } else {
            (price - self.min) / range
        }
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn scale_all(&self, prices: &[f64]) -> Vec<f64> {
        prices.iter().map(|p| self.scale(*p)).collect()
    }
}

/// Model input of `W` scaled values and the scaled value that follows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: f64,
}

/// Fits a scaler over `closes` and slides a `window_size` window with step 1,
/// producing `closes.len() - window_size` windows.
pub fn build_windows(closes: &[f64], window_size: usize) -> EngineResult<(ScalerState, Vec<Window>)> {
    if window_size == 0 || closes.len() <= window_size {
        tracing::warn!(values = closes.len(), window_size, "Not enough closes to build windows");
        return Err(EngineError::InsufficientDataError { window: window_size, actual: closes.len() });
    }

    let scaler = ScalerState::fit(closes)?;
    let scaled = scaler.scale_all(closes);
    let windows: Vec<Window> = (0..scaled.len() - window_size)
        .map(|i| Window {
            input: scaled[i..i + window_size].to_vec(),
            target: scaled[i + window_size],
        })
        .collect();

    tracing::debug!(
        values = closes.len(),
        windows = windows.len(),
        min = scaler.min,
        max = scaler.max,
        "Built training windows"
    );
    Ok((scaler, windows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f64> {
        (0..len).map(|i| 200.0 + (i as f64 * 0.37).sin() * 15.0 + i as f64).collect()
    }

    #[test]
    fn test_window_count_is_n_minus_w() {
        for (n, w) in [(61, 60), (120, 60), (10, 3)] {
            let (_, windows) = build_windows(&ramp(n), w).unwrap();
            assert_eq!(windows.len(), n - w);
            assert!(windows.iter().all(|win| win.input.len() == w));
        }
    }

    #[test]
    fn test_too_short_is_insufficient_data() {
        for n in [0, 1, 59, 60] {
            let err = build_windows(&ramp(n), 60).unwrap_err();
            assert!(matches!(err, EngineError::InsufficientDataError { window: 60, .. }), "n = {}", n);
        }
    }

    #[test]
    fn test_120_prices_give_60_windows_without_lookahead() {
        let closes = ramp(120);
        let (scaler, windows) = build_windows(&closes, 60).unwrap();
        let scaled = scaler.scale_all(&closes);
        assert_eq!(windows.len(), 60);
        assert_eq!(windows[0].input, scaled[..60].to_vec());
        assert_eq!(windows[0].target, scaled[60]);
        assert_eq!(windows[59].target, scaled[119]);
    }

    #[test]
    fn test_scaler_round_trip() {
        let closes = ramp(50);
        let scaler = ScalerState::fit(&closes).unwrap();
        for price in &closes {
            let scaled = scaler.scale(*price);
            assert!((0.0..=1.0).contains(&scaled));
            assert!((scaler.inverse(scaled) - price).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_series_scales_to_zero() {
        let closes = vec![42.0; 70];
        let (scaler, windows) = build_windows(&closes, 60).unwrap();
        assert_eq!(scaler.range(), 0.0);
        assert!(windows.iter().all(|w| w.target == 0.0 && w.input.iter().all(|v| *v == 0.0)));
        assert_eq!(scaler.inverse(0.0), 42.0);
    }
}
