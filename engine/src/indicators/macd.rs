// Moving Average Convergence Divergence (MACD)
use super::{cached_close_ema, ema_of_defined, IndicatorCalculator, SeriesCache};
use serde_json::Value;
use shared::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

pub struct Macd {
    name: String,
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, output: MacdOutput) -> Self {
        let name = match output {
            MacdOutput::Line => format!("MACD({},{})", fast, slow),
            MacdOutput::Signal => format!("MACD_SIGNAL({},{},{})", fast, slow, signal),
            MacdOutput::Histogram => format!("MACD_DIFF({},{},{})", fast, slow, signal),
        };
        Self { name, fast, slow, signal, output }
    }

    fn line(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        cache.get_or_insert_with(format!("macd_line({},{})", self.fast, self.slow), |cache| {
            let fast = cached_close_ema(data, self.fast, cache);
            let slow = cached_close_ema(data, self.slow, cache);
            fast.iter()
                .zip(slow.iter())
                .map(|(f, s)| Some((*f)? - (*s)?))
                .collect()
        })
    }

    fn signal_line(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        cache.get_or_insert_with(format!("macd_signal({},{},{})", self.fast, self.slow, self.signal), |cache| {
            ema_of_defined(&self.line(data, cache), self.signal)
        })
    }
}

impl IndicatorCalculator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "fast": self.fast, "slow": self.slow, "signal": self.signal })
    }

    fn lookback(&self) -> usize {
        let line = self.fast.max(self.slow);
        match self.output {
            MacdOutput::Line => line,
            MacdOutput::Signal | MacdOutput::Histogram => line + self.signal.saturating_sub(1),
        }
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        self.calculate_cached(data, &mut SeriesCache::default())
    }

    fn calculate_cached(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        match self.output {
            MacdOutput::Line => self.line(data, cache),
            MacdOutput::Signal => self.signal_line(data, cache),
            MacdOutput::Histogram => {
                let line = self.line(data, cache);
                let signal = self.signal_line(data, cache);
                line.iter()
                    .zip(signal.iter())
                    .map(|(l, s)| Some((*l)? - (*s)?))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::create_candle;

    fn trending(len: usize) -> Vec<Candle> {
        (0..len).map(|i| create_candle(100.0 + i as f64)).collect()
    }

    #[test]
    fn test_macd_warmup_matches_lookback() {
        let candles = trending(40);
        for output in [MacdOutput::Line, MacdOutput::Signal, MacdOutput::Histogram] {
            let macd = Macd::new(12, 26, 9, output);
            let results = macd.calculate(&candles);
            let first_defined = results.iter().position(Option::is_some).unwrap();
            assert_eq!(first_defined + 1, macd.lookback(), "{:?}", output);
        }
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let candles = trending(40);
        let line = Macd::new(12, 26, 9, MacdOutput::Line).calculate(&candles);
        assert!(line[25..].iter().all(|v| v.unwrap() > 0.0));
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let candles = vec![create_candle(5.0); 40];
        let hist = Macd::new(12, 26, 9, MacdOutput::Histogram).calculate(&candles);
        assert_eq!(hist[39], Some(0.0));
    }
}
