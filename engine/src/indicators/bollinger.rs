// Bollinger bands over the close, using the population standard deviation
use super::{IndicatorCalculator, SeriesCache};
use serde_json::Value;
use shared::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Middle,
    Upper,
    Lower,
    Width,
}

pub struct BollingerBands {
    name: String,
    period: usize,
    std_dev: f64,
    band: BollingerBand,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev: f64, band: BollingerBand) -> Self {
        Self {
            name: format!("BB_{:?}({},{})", band, period, std_dev).to_uppercase(),
            period,
            std_dev,
            band,
        }
    }

    /// Applies `stat` to every full trailing window of closes.
    fn rolling(&self, data: &[Candle], stat: impl Fn(&[Candle]) -> f64) -> Vec<Option<f64>> {
        if self.period == 0 {
            return vec![None; data.len()];
        }
        (0..data.len())
            .map(|i| (i + 1 >= self.period).then(|| stat(&data[i + 1 - self.period..=i])))
            .collect()
    }

    fn band_at(&self, mean: f64, std: f64) -> Option<f64> {
        let offset = self.std_dev * std;
        match self.band {
            BollingerBand::Middle => Some(mean),
            BollingerBand::Upper => Some(mean + offset),
            BollingerBand::Lower => Some(mean - offset),
            BollingerBand::Width => (mean != 0.0).then(|| 2.0 * offset / mean * 100.0),
        }
    }
}

fn window_mean(window: &[Candle]) -> f64 {
    window.iter().map(|c| c.close).sum::<f64>() / window.len() as f64
}

fn window_std(window: &[Candle]) -> f64 {
    let mean = window_mean(window);
    let variance = window.iter().map(|c| (c.close - mean).powi(2)).sum::<f64>() / window.len() as f64;
    variance.sqrt()
}

impl IndicatorCalculator for BollingerBands {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "period": self.period, "std_dev": self.std_dev })
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        self.calculate_cached(data, &mut SeriesCache::default())
    }

    fn calculate_cached(&self, data: &[Candle], cache: &mut SeriesCache) -> Vec<Option<f64>> {
        let means = cache.get_or_insert_with(format!("bb_mean({})", self.period), |_| self.rolling(data, window_mean));
        let stds = cache.get_or_insert_with(format!("bb_std({})", self.period), |_| self.rolling(data, window_std));
        means
            .iter()
            .zip(stds.iter())
            .map(|(mean, std)| self.band_at((*mean)?, (*std)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{assert_close, create_candle};

    fn closes(values: &[f64]) -> Vec<Candle> {
        values.iter().map(|v| create_candle(*v)).collect()
    }

    #[test]
    fn test_bands_around_mean() {
        // mean 5, population std 2
        let candles = closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let band = |b| BollingerBands::new(8, 2.0, b).calculate(&candles)[7];
        assert_close(band(BollingerBand::Middle), 5.0);
        assert_close(band(BollingerBand::Upper), 9.0);
        assert_close(band(BollingerBand::Lower), 1.0);
        assert_close(band(BollingerBand::Width), 160.0);
    }

    #[test]
    fn test_flat_series_collapses_bands() {
        let candles = closes(&[3.0; 5]);
        let upper = BollingerBands::new(3, 2.0, BollingerBand::Upper).calculate(&candles);
        assert!(upper[..2].iter().all(Option::is_none));
        assert_close(upper[4], 3.0);
    }
}
