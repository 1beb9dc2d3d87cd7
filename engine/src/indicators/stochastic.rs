// Momentum oscillators: stochastic %K/%D and rate of change
use super::{sma_of_defined, IndicatorCalculator, SeriesCache};
use serde_json::Value;
use shared::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochasticOutput {
    K,
    D,
}

pub struct Stochastic {
    name: String,
    period: usize,
    smoothing: usize,
    output: StochasticOutput,
}

impl Stochastic {
    pub fn new(period: usize, smoothing: usize, output: StochasticOutput) -> Self {
        let name = match output {
            StochasticOutput::K => format!("STOCH_K({})", period),
            StochasticOutput::D => format!("STOCH_D({},{})", period, smoothing),
        };
        Self { name, period, smoothing, output }
    }

    fn percent_k(&self, data: &[Candle]) -> Vec<Option<f64>> {
        if self.period == 0 {
            return vec![None; data.len()];
        }
        (0..data.len())
            .map(|i| {
                if i + 1 < self.period {
                    return None;
                }
                let window = &data[i + 1 - self.period..=i];
                let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
                let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
                let range = highest - lowest;
                // Undefined when the window has no range.
                (range > 0.0).then(|| 100.0 * (data[i].close - lowest) / range)
            })
            .collect()
    }
}

impl IndicatorCalculator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "period": self.period, "smoothing": self.smoothing })
    }

    fn lookback(&self) -> usize {
        match self.output {
            StochasticOutput::K => self.period,
            StochasticOutput::D => self.period + self.smoothing.saturating_sub(1),
        }
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        self.calculate_cached(data, &mut SeriesCache::default())
    }

    fn calculate_cached(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        let k = cache.get_or_insert_with(format!("stoch_k({})", self.period), |_| self.percent_k(data));
        match self.output {
            StochasticOutput::K => k,
            StochasticOutput::D => sma_of_defined(&k, self.smoothing),
        }
    }
}

pub struct RateOfChange {
    name: String,
    period: usize,
}

impl RateOfChange {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("ROC({})", period),
            period,
        }
    }
}

impl IndicatorCalculator for RateOfChange {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "period": self.period })
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        if self.period == 0 {
            return vec![None; data.len()];
        }
        (0..data.len())
            .map(|i| {
                let previous = data[i.checked_sub(self.period)?].close;
                (previous != 0.0).then(|| (data[i].close - previous) / previous * 100.0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{assert_close, create_candle, create_hlcv};

    #[test]
    fn test_percent_k_position_in_range() {
        let candles = create_hlcv(&[
            (10.0, 8.0, 9.0, 1.0),
            (12.0, 9.0, 11.0, 1.0),
            (11.0, 7.0, 10.0, 1.0),
        ]);
        let k = Stochastic::new(3, 3, StochasticOutput::K).calculate(&candles);
        assert!(k[..2].iter().all(Option::is_none));
        // highest 12, lowest 7, close 10 -> 60%
        assert_close(k[2], 60.0);
    }

    #[test]
    fn test_percent_d_smooths_k() {
        let rows: Vec<(f64, f64, f64, f64)> =
            (0..6).map(|i| (10.0 + i as f64, 5.0, 8.0 + i as f64, 1.0)).collect();
        let candles = create_hlcv(&rows);
        let stoch_k = Stochastic::new(3, 3, StochasticOutput::K);
        let stoch_d = Stochastic::new(3, 3, StochasticOutput::D);
        let k = stoch_k.calculate(&candles);
        let d = stoch_d.calculate(&candles);
        assert_eq!(d.iter().position(Option::is_some), Some(stoch_d.lookback() - 1));
        let expected = (k[2].unwrap() + k[3].unwrap() + k[4].unwrap()) / 3.0;
        assert_close(d[4], expected);
    }

    #[test]
    fn test_percent_k_undefined_without_range() {
        let candles = vec![create_candle(3.0); 5];
        let k = Stochastic::new(3, 3, StochasticOutput::K).calculate(&candles);
        assert!(k.iter().all(Option::is_none));
    }

    #[test]
    fn test_rate_of_change() {
        let candles: Vec<Candle> = [100.0, 105.0, 110.0].iter().map(|c| create_candle(*c)).collect();
        let roc = RateOfChange::new(2).calculate(&candles);
        assert!(roc[..2].iter().all(Option::is_none));
        assert_close(roc[2], 10.0);
    }
}
