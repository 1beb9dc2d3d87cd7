// Relative Strength Index (RSI) with Wilder smoothing
use super::IndicatorCalculator;
use serde_json::Value;
use shared::Candle;

pub struct Rsi {
    name: String,
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("RSI({})", period),
            period,
        }
    }

    fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            // No losses in the window: RSI saturates at 100 (flat series included).
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        }
    }
}

impl IndicatorCalculator for Rsi {
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
        if data.len() <= self.period || self.period == 0 {
            return vec![None; data.len()];
        }

        let period = self.period as f64;
        let mut results = vec![None; self.period]; // RSI needs 'period' initial changes

        let (gains, losses) = data[..=self.period].windows(2).fold((0.0, 0.0), |(g, l), pair| {
            let change = pair[1].close - pair[0].close;
            if change > 0.0 { (g + change, l) } else { (g, l - change) }
        });

        let mut avg_gain = gains / period;
        let mut avg_loss = losses / period;
        results.push(Some(Self::rsi_from_averages(avg_gain, avg_loss)));

        for pair in data[self.period..].windows(2) {
            let change = pair[1].close - pair[0].close;
            let (current_gain, current_loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };

            avg_gain = (avg_gain * (period - 1.0) + current_gain) / period;
            avg_loss = (avg_loss * (period - 1.0) + current_loss) / period;
            results.push(Some(Self::rsi_from_averages(avg_gain, avg_loss)));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::create_candle;

    #[test]
    fn test_rsi_calculation() {
        // Closes from the classic StockCharts RSI walkthrough.
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64, 46.25,
        ];
        let candles: Vec<Candle> = closes.iter().map(|c| create_candle(*c)).collect();
        let results = Rsi::new(14).calculate(&candles);

        assert_eq!(results.len(), closes.len());
        for (i, value) in results.iter().enumerate().take(14) {
            assert_eq!(*value, None, "Expected None at index {}", i);
        }
        let first = results[14].unwrap();
        assert!(first > 50.0 && first < 80.0, "RSI[14] out of expected range: {}", first);
        assert!(results[15].unwrap() < first, "a down close should lower RSI");
        for value in results.iter().skip(14) {
            let v = value.unwrap();
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let candles = vec![create_candle(1.0); 10];
        assert_eq!(Rsi::new(14).calculate(&candles), vec![None; 10]);
    }

    #[test]
    fn test_rsi_all_gains() {
        let candles = (1..=20).map(|i| create_candle(i as f64)).collect::<Vec<_>>();
        let results = Rsi::new(14).calculate(&candles);
        assert!(results[..14].iter().all(Option::is_none));
        assert!(results[14..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_rsi_all_losses() {
        let candles = (1..=20).map(|i| create_candle(20.0 - i as f64)).collect::<Vec<_>>();
        let results = Rsi::new(14).calculate(&candles);
        // avg_gain stays 0, so RS is 0 and RSI is 0
        assert!(results[14..].iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn test_rsi_lookback() {
        assert_eq!(Rsi::new(14).lookback(), 15);
    }
}
