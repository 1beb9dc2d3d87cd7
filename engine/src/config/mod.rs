pub mod settings;

pub use settings::{ModelConfig, PipelineSettings, SourceSettings};
