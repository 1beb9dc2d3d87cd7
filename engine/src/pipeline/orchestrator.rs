// Runs fetch -> validate -> indicators for each requested interval.
use shared::{Interval, PipelineFailure, PipelineResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::data::CandleSource;
use crate::error::EngineResult;
use crate::indicators::{FillMode, IndicatorEngine};
use crate::validation::validate;

pub struct Orchestrator {
    source: Arc<dyn CandleSource>,
    indicators: IndicatorEngine,
    candle_limit: usize,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn CandleSource>, fill_mode: FillMode, candle_limit: usize) -> Self {
        Self {
            source,
            indicators: IndicatorEngine::new(fill_mode),
            candle_limit,
        }
    }

    pub fn fill_mode(&self) -> FillMode {
        self.indicators.fill_mode()
    }

    /// One pass per interval, in interval order. A failing interval is
    /// recorded in its own result and does not stop its siblings.
    pub async fn run(&self, symbol: &str, intervals: &BTreeSet<Interval>) -> BTreeMap<Interval, PipelineResult> {
        let mut results = BTreeMap::new();
        for interval in intervals {
            results.insert(*interval, self.run_interval(symbol, *interval).await);
        }
        let failed = results.values().filter(|r| !r.is_success()).count();
        tracing::info!(
            symbol,
            intervals = results.len(),
            failed,
            source = self.source.name(),
            "Pipeline run finished"
        );
        results
    }

    pub async fn run_interval(&self, symbol: &str, interval: Interval) -> PipelineResult {
        match self.try_run_interval(symbol, interval).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(symbol, %interval, kind = %e.kind(), error_detail = %e, "Interval pipeline failed");
                PipelineResult::failure(interval, PipelineFailure::from(&e))
            }
        }
    }

    async fn try_run_interval(&self, symbol: &str, interval: Interval) -> EngineResult<PipelineResult> {
        let candles = self.source.fetch(symbol, interval, self.candle_limit).await?;
        let series = validate(candles)?;
        let current_price = series.latest_close();
        let features = self.indicators.compute(&series)?;
        tracing::debug!(
            symbol,
            %interval,
            rows = features.len(),
            current_price,
            fill_mode = self.fill_mode().as_str(),
            "Interval pipeline succeeded"
        );
        Ok(PipelineResult::success(interval, features, current_price))
    }
}
