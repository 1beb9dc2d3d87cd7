// Domain models shared between the engine and its presentation/export collaborators.
pub mod models;
pub mod results;

pub use models::{Candle, FeatureClass, FeatureField, FeatureRow, Interval, FEATURE_COUNT};
pub use results::{
    ChartSpec, ErrorKind, OverlaySeries, PipelineFailure, PipelineResult, PipelineState,
    PresentationUpdate, RefreshStatus,
};
