// Engine library root: candle sources, validation, indicators, forecasting and the refresh pipeline.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod forecast;
pub mod indicators;
pub mod pipeline;
pub mod validation;

pub use error::{EngineError, EngineResult};
