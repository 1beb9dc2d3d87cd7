// Pipeline settings, loaded from a JSON file and overridden by environment variables.
use serde::Deserialize;
use shared::{FeatureField, Interval};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::indicators::FillMode;

pub const API_KEY_ENV: &str = "CRYPTOCOMPARE_API_KEY";
pub const SYMBOL_ENV: &str = "FORECAST_SYMBOL";
pub const REFRESH_SECS_ENV: &str = "FORECAST_REFRESH_SECS";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    pub symbol: String,
    pub intervals: Vec<Interval>,
    pub api_key: Option<String>,
    pub refresh_period_secs: u64,
    /// Upper bound for the rate-limit backoff of the refresh loop.
    pub max_backoff_secs: u64,
    pub candle_limit: usize,
    pub fill_mode: FillMode,
    pub overlay_fields: Vec<FeatureField>,
    pub source: SourceSettings,
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub quote_currency: String,
    pub exchange: String,
    pub request_timeout_secs: u64,
}

/// Hyper-parameters of the sequence regressor.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub window_size: usize,
    pub hidden_units: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            symbol: "BTC".to_string(),
            intervals: vec![Interval::Hour1],
            api_key: None,
            refresh_period_secs: 1,
            max_backoff_secs: 300,
            candle_limit: 120,
            fill_mode: FillMode::FillNa,
            overlay_fields: vec![
                FeatureField::TrendSmaFast,
                FeatureField::TrendSmaSlow,
                FeatureField::MomentumRsi,
            ],
            source: SourceSettings::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            base_url: "https://min-api.cryptocompare.com".to_string(),
            quote_currency: "USDT".to_string(),
            exchange: "CCCAGG".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            window_size: 60,
            hidden_units: 50,
            dropout: 0.2,
            epochs: 25,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

impl PipelineSettings {
    /// Reads settings from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let settings: PipelineSettings = serde_json::from_str(&raw).map_err(|e| {
            EngineError::ConfigError(format!("Invalid settings file '{}': {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Loaded pipeline settings");
        Ok(settings)
    }

    /// Loads `path` when given (defaults otherwise), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let settings = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default(),
        };
        settings.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` (the process environment in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(symbol) = lookup(SYMBOL_ENV) {
            self.symbol = symbol;
        }
        if let Some(secs) = lookup(REFRESH_SECS_ENV) {
            self.refresh_period_secs = secs.trim().parse().map_err(|e| {
                EngineError::ConfigError(format!("{} must be an integer: {}", REFRESH_SECS_ENV, e))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::ConfigError("symbol must not be empty".to_string()));
        }
        if self.intervals.is_empty() {
            return Err(EngineError::ConfigError("at least one interval is required".to_string()));
        }
        if self.refresh_period_secs == 0 {
            return Err(EngineError::ConfigError("refresh period must be at least 1 second".to_string()));
        }
        if self.candle_limit == 0 {
            return Err(EngineError::ConfigError("candle_limit must be positive".to_string()));
        }
        self.model.validate()
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(self.refresh_period_secs))
    }
}

impl ModelConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.window_size == 0 || self.hidden_units == 0 || self.batch_size == 0 {
            return Err(EngineError::ConfigError(
                "window_size, hidden_units and batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(EngineError::ConfigError(format!("dropout {} must be in [0, 1)", self.dropout)));
        }
        if self.learning_rate <= 0.0 {
            return Err(EngineError::ConfigError("learning_rate must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_model_contract() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.model.window_size, 60);
        assert_eq!(settings.model.hidden_units, 50);
        assert_eq!(settings.model.epochs, 25);
        assert_eq!(settings.model.batch_size, 32);
        assert_eq!(settings.fill_mode, FillMode::FillNa);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_json_file_overrides_only_given_keys() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"symbol": "ETH", "intervals": ["5m", "1d"], "fill_mode": "strict"}}"#).unwrap();
        let settings = PipelineSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.symbol, "ETH");
        assert_eq!(settings.intervals, vec![Interval::Minute5, Interval::Day1]);
        assert_eq!(settings.fill_mode, FillMode::Strict);
        assert_eq!(settings.candle_limit, 120);
    }

    #[test]
    fn test_env_overrides_apply() {
        let settings = PipelineSettings::default()
            .with_env_overrides(|key| match key {
                API_KEY_ENV => Some("secret".to_string()),
                REFRESH_SECS_ENV => Some("15".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.refresh_period(), Duration::from_secs(15));
    }

    #[test]
    fn test_bad_refresh_env_is_config_error() {
        let err = PipelineSettings::default()
            .with_env_overrides(|key| (key == REFRESH_SECS_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_dropout_rejected() {
        let model = ModelConfig { dropout: 1.0, ..ModelConfig::default() };
        assert!(model.validate().is_err());
    }
}
