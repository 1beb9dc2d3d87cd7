// Derives the fixed FeatureRow schema from a validated candle series.
use serde::Deserialize;
use shared::{FeatureField, FeatureRow, FEATURE_COUNT};

use super::{
    Atr, BollingerBand, BollingerBands, ChaikinMoneyFlow, Ema, IndicatorCalculator, Macd,
    MacdOutput, MoneyFlowIndex, OnBalanceVolume, RateOfChange, Rsi, SeriesCache, Sma, Stochastic,
    StochasticOutput,
};
use crate::error::{EngineError, EngineResult};
use crate::validation::ValidatedSeries;

/// How warm-up gaps in indicator output are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Forward-fill then zero-fill; output length equals input length.
    #[default]
    FillNa,
    /// Drop every row that still has an undefined value.
    Strict,
}

impl FillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::FillNa => "fillna",
            FillMode::Strict => "strict",
        }
    }
}

/// Computes every [`FeatureField`] for a series. Holds no state between calls.
pub struct IndicatorEngine {
    fill_mode: FillMode,
    calculators: Vec<(FeatureField, Box<dyn IndicatorCalculator>)>,
}

impl IndicatorEngine {
    pub fn new(fill_mode: FillMode) -> Self {
        let calculators = FeatureField::ALL
            .iter()
            .map(|field| (*field, Self::calculator_for(*field)))
            .collect();
        Self { fill_mode, calculators }
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    fn calculator_for(field: FeatureField) -> Box<dyn IndicatorCalculator> {
        match field {
            FeatureField::TrendSmaFast => Box::new(Sma::new(12)),
            FeatureField::TrendSmaSlow => Box::new(Sma::new(26)),
            FeatureField::TrendEmaFast => Box::new(Ema::new(12)),
            FeatureField::TrendEmaSlow => Box::new(Ema::new(26)),
            FeatureField::TrendMacd => Box::new(Macd::new(12, 26, 9, MacdOutput::Line)),
            FeatureField::TrendMacdSignal => Box::new(Macd::new(12, 26, 9, MacdOutput::Signal)),
            FeatureField::TrendMacdDiff => Box::new(Macd::new(12, 26, 9, MacdOutput::Histogram)),
            FeatureField::MomentumRsi => Box::new(Rsi::new(14)),
            FeatureField::MomentumStoch => Box::new(Stochastic::new(14, 3, StochasticOutput::K)),
            FeatureField::MomentumStochSignal => Box::new(Stochastic::new(14, 3, StochasticOutput::D)),
            FeatureField::MomentumRoc => Box::new(RateOfChange::new(12)),
            FeatureField::VolatilityBbm => Box::new(BollingerBands::new(20, 2.0, BollingerBand::Middle)),
            FeatureField::VolatilityBbh => Box::new(BollingerBands::new(20, 2.0, BollingerBand::Upper)),
            FeatureField::VolatilityBbl => Box::new(BollingerBands::new(20, 2.0, BollingerBand::Lower)),
            FeatureField::VolatilityBbw => Box::new(BollingerBands::new(20, 2.0, BollingerBand::Width)),
            FeatureField::VolatilityAtr => Box::new(Atr::new(14)),
            FeatureField::VolumeObv => Box::new(OnBalanceVolume::new()),
            FeatureField::VolumeCmf => Box::new(ChaikinMoneyFlow::new(20)),
            FeatureField::VolumeMfi => Box::new(MoneyFlowIndex::new(14)),
        }
    }

    /// Rows needed for every indicator to produce at least one value.
    pub fn required_rows(&self) -> usize {
        self.calculators
            .iter()
            .map(|(_, calc)| calc.lookback())
            .max()
            .unwrap_or(0)
    }

    pub fn compute(&self, series: &ValidatedSeries) -> EngineResult<Vec<FeatureRow>> {
        let candles = series.candles();
        let required = self.required_rows();
        if candles.len() < required {
            tracing::error!(rows = candles.len(), required, "Not enough rows for indicator lookbacks");
            return Err(EngineError::IndicatorComputationError(format!(
                "{} rows supplied, the longest indicator lookback needs {}",
                candles.len(),
                required
            )));
        }

        let mut cache = SeriesCache::default();
        let columns = self.columns(candles, &mut cache)?;
        tracing::trace!(shared_series = cache.len(), reused = cache.hits(), "Indicator columns computed");

        let rows = match self.fill_mode {
            FillMode::FillNa => Self::fill_rows(candles, &columns),
            FillMode::Strict => Self::strict_rows(candles, &columns),
        };
        tracing::debug!(
            input_rows = candles.len(),
            output_rows = rows.len(),
            fill_mode = self.fill_mode.as_str(),
            "Indicator features computed"
        );
        Ok(rows)
    }

    /// One column per field, in `FeatureField::ALL` order.
    fn columns(&self, candles: &[shared::Candle], cache: &mut SeriesCache) -> EngineResult<Vec<Vec<Option<f64>>>> {
        let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(FEATURE_COUNT);
        for (field, calc) in &self.calculators {
            let values = calc.calculate_cached(candles, cache);
            if values.len() != candles.len() {
                return Err(EngineError::IndicatorComputationError(format!(
                    "{} produced {} values for {} rows",
                    calc.name(),
                    values.len(),
                    candles.len()
                )));
            }
            tracing::trace!(field = %field, indicator = calc.name(), parameters = %calc.parameters(), "Indicator computed");
            columns.push(values);
        }
        Ok(columns)
    }

    fn fill_rows(candles: &[shared::Candle], columns: &[Vec<Option<f64>>]) -> Vec<FeatureRow> {
        let mut last = [None::<f64>; FEATURE_COUNT];
        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let mut values = [0.0; FEATURE_COUNT];
                for (col, column) in columns.iter().enumerate() {
                    if let Some(v) = column[i] {
                        last[col] = Some(v);
                    }
                    values[col] = last[col].unwrap_or(0.0);
                }
                FeatureRow::new(candle.clone(), values)
            })
            .collect()
    }

    fn strict_rows(candles: &[shared::Candle], columns: &[Vec<Option<f64>>]) -> Vec<FeatureRow> {
        candles
            .iter()
            .enumerate()
            .filter_map(|(i, candle)| {
                let mut values = [0.0; FEATURE_COUNT];
                for (col, column) in columns.iter().enumerate() {
                    values[col] = column[i]?;
                }
                Some(FeatureRow::new(candle.clone(), values))
            })
            .collect()
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(FillMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::tests::hourly_series;
    use crate::validation::{validate, validate_with_min_len};

    #[test]
    fn test_required_rows_is_macd_signal() {
        assert_eq!(IndicatorEngine::default().required_rows(), 34);
    }

    #[test]
    fn test_fillna_keeps_every_row() {
        let series = validate(hourly_series(60)).unwrap();
        let rows = IndicatorEngine::new(FillMode::FillNa).compute(&series).unwrap();
        assert_eq!(rows.len(), 60);
        for (row, candle) in rows.iter().zip(series.candles()) {
            assert_eq!(&row.candle, candle);
            assert!(row.values.iter().all(|v| v.is_finite()));
        }
        // Leading warm-up is zero-filled, later rows carry real values.
        assert_eq!(rows[0].get(FeatureField::TrendSmaSlow), 0.0);
        assert!(rows[59].get(FeatureField::TrendSmaSlow) > 0.0);
    }

    #[test]
    fn test_strict_drops_warmup_rows() {
        let series = validate(hourly_series(60)).unwrap();
        let rows = IndicatorEngine::new(FillMode::Strict).compute(&series).unwrap();
        assert!(rows.len() < 60);
        assert_eq!(rows.len(), 60 - 33);
        assert_eq!(rows[0].candle, series.candles()[33]);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let series = validate(hourly_series(80)).unwrap();
        let engine = IndicatorEngine::default();
        assert_eq!(engine.compute(&series).unwrap(), engine.compute(&series).unwrap());
    }

    #[test]
    fn test_fillna_forward_fills_interior_gaps() {
        // A flat stretch makes %K undefined; the previous value must carry over.
        let mut candles = hourly_series(60);
        for candle in candles.iter_mut().skip(40) {
            candle.open = 100.0;
            candle.high = 100.0;
            candle.low = 100.0;
            candle.close = 100.0;
        }
        let series = validate(candles).unwrap();
        let rows = IndicatorEngine::new(FillMode::FillNa).compute(&series).unwrap();
        // Windows from row 53 on see no range at all.
        let last_defined = rows[52].get(FeatureField::MomentumStoch);
        assert_eq!(rows[59].get(FeatureField::MomentumStoch), last_defined);
    }

    #[test]
    fn test_shared_intermediates_match_standalone_calculation() {
        let series = validate(hourly_series(80)).unwrap();
        let engine = IndicatorEngine::default();
        let mut cache = SeriesCache::default();
        let columns = engine.columns(series.candles(), &mut cache).unwrap();

        for ((field, calc), column) in engine.calculators.iter().zip(&columns) {
            assert_eq!(column, &calc.calculate(series.candles()), "{}", field);
        }
        // Two close EMAs, MACD line and signal, %K, Bollinger mean and std.
        assert_eq!(cache.len(), 7);
        assert!(cache.hits() >= 9);
    }

    #[test]
    fn test_short_series_is_indicator_error() {
        let series = validate_with_min_len(hourly_series(20), 10).unwrap();
        let err = IndicatorEngine::default().compute(&series).unwrap_err();
        assert!(matches!(err, EngineError::IndicatorComputationError(_)));
    }
}
