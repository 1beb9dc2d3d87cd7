// Volume-based indicators: OBV, Chaikin money flow, money flow index
use super::IndicatorCalculator;
use serde_json::Value;
use shared::Candle;

pub struct OnBalanceVolume {
    name: String,
}

impl OnBalanceVolume {
    pub fn new() -> Self {
        Self { name: "OBV".to_string() }
    }
}

impl Default for OnBalanceVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorCalculator for OnBalanceVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> Value {
        serde_json::json!({})
    }

    fn lookback(&self) -> usize {
        1
    }

    fn calculate(&self, data: &[Candle]) -> Vec<Option<f64>> {
        let mut obv = 0.0;
        data.iter()
            .enumerate()
            .map(|(i, c)| {
                if let Some(prev) = i.checked_sub(1).map(|p| &data[p]) {
                    if c.close > prev.close {
                        obv += c.volume;
                    } else if c.close < prev.close {
                        obv -= c.volume;
                    }
                }
                Some(obv)
            })
            .collect()
    }
}

pub struct ChaikinMoneyFlow {
    name: String,
    period: usize,
}

impl ChaikinMoneyFlow {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("CMF({})", period),
            period,
        }
    }

    fn money_flow_volume(c: &Candle) -> f64 {
        let range = c.high - c.low;
        if range == 0.0 {
            0.0
        } else {
            ((c.close - c.low) - (c.high - c.close)) / range * c.volume
        }
    }
}

impl IndicatorCalculator for ChaikinMoneyFlow {
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
        if self.period == 0 {
            return vec![None; data.len()];
        }
        (0..data.len())
            .map(|i| {
                if i + 1 < self.period {
                    return None;
                }
                let window = &data[i + 1 - self.period..=i];
                let volume: f64 = window.iter().map(|c| c.volume).sum();
                let flow: f64 = window.iter().map(Self::money_flow_volume).sum();
                (volume != 0.0).then(|| flow / volume)
            })
            .collect()
    }
}

pub struct MoneyFlowIndex {
    name: String,
    period: usize,
}

impl MoneyFlowIndex {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("MFI({})", period),
            period,
        }
    }
}

impl IndicatorCalculator for MoneyFlowIndex {
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
        if self.period == 0 || data.len() <= self.period {
            return vec![None; data.len()];
        }
        let typical: Vec<f64> = data.iter().map(|c| (c.high + c.low + c.close) / 3.0).collect();
        // Signed raw money flow per step; index 0 has no direction.
        let flows: Vec<f64> = (1..data.len())
            .map(|i| {
                let raw = typical[i] * data[i].volume;
                if typical[i] > typical[i - 1] {
                    raw
                } else if typical[i] < typical[i - 1] {
                    -raw
                } else {
                    0.0
                }
            })
            .collect();

        let mut results = vec![None; self.period];
        for window in flows.windows(self.period) {
            let positive: f64 = window.iter().filter(|f| **f > 0.0).sum();
            let negative: f64 = -window.iter().filter(|f| **f < 0.0).sum::<f64>();
            let mfi = if negative == 0.0 {
                if positive == 0.0 { None } else { Some(100.0) }
            } else {
                Some(100.0 - 100.0 / (1.0 + positive / negative))
            };
            results.push(mfi);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{assert_close, create_hlcv};

    #[test]
    fn test_obv_accumulates_by_direction() {
        let candles = create_hlcv(&[
            (1.0, 1.0, 10.0, 100.0),
            (1.0, 1.0, 11.0, 50.0),
            (1.0, 1.0, 9.0, 30.0),
            (1.0, 1.0, 9.0, 70.0),
        ]);
        let obv = OnBalanceVolume::new().calculate(&candles);
        assert_eq!(obv, vec![Some(0.0), Some(50.0), Some(20.0), Some(20.0)]);
    }

    #[test]
    fn test_cmf_close_at_high_is_one() {
        let candles = create_hlcv(&[(10.0, 8.0, 10.0, 5.0), (12.0, 9.0, 12.0, 7.0)]);
        let cmf = ChaikinMoneyFlow::new(2).calculate(&candles);
        assert_eq!(cmf[0], None);
        assert_close(cmf[1], 1.0);
    }

    #[test]
    fn test_mfi_all_rising_is_100() {
        let rows: Vec<(f64, f64, f64, f64)> =
            (0..6).map(|i| (11.0 + i as f64, 9.0 + i as f64, 10.0 + i as f64, 10.0)).collect();
        let candles = create_hlcv(&rows);
        let mfi = MoneyFlowIndex::new(3).calculate(&candles);
        assert_eq!(mfi.len(), 6);
        assert!(mfi[..3].iter().all(Option::is_none));
        assert!(mfi[3..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_mfi_balanced_flows() {
        // typical prices 10, 11, 10 with equal volume: +11v and -10v
        let candles = create_hlcv(&[
            (10.0, 10.0, 10.0, 1.0),
            (11.0, 11.0, 11.0, 1.0),
            (10.0, 10.0, 10.0, 1.0),
        ]);
        let mfi = MoneyFlowIndex::new(2).calculate(&candles);
        assert_close(mfi[2], 100.0 - 100.0 / (1.0 + 11.0 / 10.0));
    }
}
