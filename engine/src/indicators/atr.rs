// Average True Range (ATR) with Wilder smoothing
use super::IndicatorCalculator;
use serde_json::Value;
use shared::Candle;

pub struct Atr {
    name: String,
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("ATR({})", period),
            period,
        }
    }

    fn true_range(data: &[Candle]) -> Vec<f64> {
        data.iter()
            .enumerate()
            .map(|(i, c)| {
                let range = c.high - c.low;
                match i.checked_sub(1).map(|p| data[p].close) {
                    Some(prev_close) => range
                        .max((c.high - prev_close).abs())
                        .max((c.low - prev_close).abs()),
                    None => range,
                }
            })
            .collect()
    }
}

impl IndicatorCalculator for Atr {
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
        if self.period == 0 || data.len() < self.period {
            return vec![None; data.len()];
        }
        let period = self.period as f64;
        let tr = Self::true_range(data);

        let mut results = vec![None; self.period - 1];
        let mut atr = tr[..self.period].iter().sum::<f64>() / period;
        results.push(Some(atr));
        for value in &tr[self.period..] {
            atr = (atr * (period - 1.0) + value) / period;
            results.push(Some(atr));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{assert_close, create_hlcv};

    #[test]
    fn test_true_range_uses_previous_close_gap() {
        let candles = create_hlcv(&[(10.0, 9.0, 9.5, 1.0), (14.0, 13.0, 13.5, 1.0)]);
        let tr = Atr::true_range(&candles);
        assert_eq!(tr, vec![1.0, 4.5]);
    }

    #[test]
    fn test_atr_wilder_smoothing() {
        let candles = create_hlcv(&[
            (10.0, 8.0, 9.0, 1.0),
            (11.0, 9.0, 10.0, 1.0),
            (12.0, 10.0, 11.0, 1.0),
            (15.0, 11.0, 14.0, 1.0),
        ]);
        let atr = Atr::new(3).calculate(&candles);
        assert!(atr[..2].iter().all(Option::is_none));
        assert_close(atr[2], 2.0);
        // (2 * 2 + 4) / 3
        assert_close(atr[3], 8.0 / 3.0);
    }
}
