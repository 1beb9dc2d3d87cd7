use async_trait::async_trait;
use shared::{Candle, Interval};

use crate::error::EngineResult;

/// Where candles come from. Implementations return the most recent `limit`
/// candles in ascending time order and classify their failures as
/// network, rate-limit, unknown-symbol or schema errors.
#[async_trait]
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, symbol: &str, interval: Interval, limit: usize) -> EngineResult<Vec<Candle>>;
}
