// Exponential Moving Average (EMA) indicator implementation
use super::{cached_close_ema, IndicatorCalculator, SeriesCache};
use serde_json::Value;
use shared::Candle;

pub struct Ema {
    name: String,
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("EMA({})", period),
            period,
        }
    }
}

impl IndicatorCalculator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "period": self.period })
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        self.calculate_cached(data, &mut SeriesCache::default())
    }

    fn calculate_cached(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        // The first EMA value is seeded with the SMA of the first `period` closes.
        cached_close_ema(data, self.period, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::create_candle;

    #[test]
    fn test_ema_calculation() {
        let candles = vec![
            create_candle(10.0), create_candle(11.0), create_candle(12.0),
            create_candle(13.0), create_candle(14.0),
        ];
        let ema = Ema::new(3); // Period 3
        let results = ema.calculate(&candles);
        // SMA for first 3: (10+11+12)/3 = 11.0
        // EMA for 13: (13 - 11.0) * (2/(3+1)) + 11.0 = 12.0
        // EMA for 14: (14 - 12.0) * 0.5 + 12.0 = 13.0
        assert_eq!(results[2].unwrap(), 11.0);
        assert_eq!(results[3].unwrap(), 12.0);
        assert_eq!(results[4].unwrap(), 13.0);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0], None);
        assert_eq!(results[1], None);
    }

    #[test]
    fn test_ema_shorter_than_period() {
        let candles = vec![create_candle(1.0), create_candle(2.0)];
        assert_eq!(Ema::new(3).calculate(&candles), vec![None, None]);
    }
}
