use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One OHLCV observation for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Field names and values in OHLCV order, used by validation and export.
    pub fn ohlcv(&self) -> [(&'static str, f64); 5] {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ]
    }
}

/// Candle bucket size. Ordered from shortest to longest so that interval-keyed
/// maps iterate in a natural order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::Minute1,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Hour1,
        Interval::Hour4,
        Interval::Day1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour4 => "4h",
            Interval::Day1 => "1d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::Minute1 => Duration::minutes(1),
            Interval::Minute5 => Duration::minutes(5),
            Interval::Minute15 => Duration::minutes(15),
            Interval::Minute30 => Duration::minutes(30),
            Interval::Hour1 => Duration::hours(1),
            Interval::Hour4 => Duration::hours(4),
            Interval::Day1 => Duration::days(1),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|interval| interval.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown interval '{}'. Expected one of 1m,5m,15m,30m,1h,4h,1d", s))
    }
}

/// Indicator family a feature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureClass {
    Trend,
    Momentum,
    Volatility,
    Volume,
}

/// The fixed set of derived indicator fields carried by every [`FeatureRow`].
///
/// Column names follow the `<class>_<indicator>` convention so exported sheets
/// line up with commonly used TA feature tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    TrendSmaFast,
    TrendSmaSlow,
    TrendEmaFast,
    TrendEmaSlow,
    TrendMacd,
    TrendMacdSignal,
    TrendMacdDiff,
    MomentumRsi,
    MomentumStoch,
    MomentumStochSignal,
    MomentumRoc,
    VolatilityBbm,
    VolatilityBbh,
    VolatilityBbl,
    VolatilityBbw,
    VolatilityAtr,
    VolumeObv,
    VolumeCmf,
    VolumeMfi,
}

pub const FEATURE_COUNT: usize = 19;

impl FeatureField {
    pub const ALL: [FeatureField; FEATURE_COUNT] = [
        FeatureField::TrendSmaFast,
        FeatureField::TrendSmaSlow,
        FeatureField::TrendEmaFast,
        FeatureField::TrendEmaSlow,
        FeatureField::TrendMacd,
        FeatureField::TrendMacdSignal,
        FeatureField::TrendMacdDiff,
        FeatureField::MomentumRsi,
        FeatureField::MomentumStoch,
        FeatureField::MomentumStochSignal,
        FeatureField::MomentumRoc,
        FeatureField::VolatilityBbm,
        FeatureField::VolatilityBbh,
        FeatureField::VolatilityBbl,
        FeatureField::VolatilityBbw,
        FeatureField::VolatilityAtr,
        FeatureField::VolumeObv,
        FeatureField::VolumeCmf,
        FeatureField::VolumeMfi,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            FeatureField::TrendSmaFast => "trend_sma_fast",
            FeatureField::TrendSmaSlow => "trend_sma_slow",
            FeatureField::TrendEmaFast => "trend_ema_fast",
            FeatureField::TrendEmaSlow => "trend_ema_slow",
            FeatureField::TrendMacd => "trend_macd",
            FeatureField::TrendMacdSignal => "trend_macd_signal",
            FeatureField::TrendMacdDiff => "trend_macd_diff",
            FeatureField::MomentumRsi => "momentum_rsi",
            FeatureField::MomentumStoch => "momentum_stoch",
            FeatureField::MomentumStochSignal => "momentum_stoch_signal",
            FeatureField::MomentumRoc => "momentum_roc",
            FeatureField::VolatilityBbm => "volatility_bbm",
            FeatureField::VolatilityBbh => "volatility_bbh",
            FeatureField::VolatilityBbl => "volatility_bbl",
            FeatureField::VolatilityBbw => "volatility_bbw",
            FeatureField::VolatilityAtr => "volatility_atr",
            FeatureField::VolumeObv => "volume_obv",
            FeatureField::VolumeCmf => "volume_cmf",
            FeatureField::VolumeMfi => "volume_mfi",
        }
    }

    pub fn class(&self) -> FeatureClass {
        match self {
            FeatureField::TrendSmaFast
            | FeatureField::TrendSmaSlow
            | FeatureField::TrendEmaFast
            | FeatureField::TrendEmaSlow
            | FeatureField::TrendMacd
            | FeatureField::TrendMacdSignal
            | FeatureField::TrendMacdDiff => FeatureClass::Trend,
            FeatureField::MomentumRsi
            | FeatureField::MomentumStoch
            | FeatureField::MomentumStochSignal
            | FeatureField::MomentumRoc => FeatureClass::Momentum,
            FeatureField::VolatilityBbm
            | FeatureField::VolatilityBbh
            | FeatureField::VolatilityBbl
            | FeatureField::VolatilityBbw
            | FeatureField::VolatilityAtr => FeatureClass::Volatility,
            FeatureField::VolumeObv | FeatureField::VolumeCmf | FeatureField::VolumeMfi => {
                FeatureClass::Volume
            }
        }
    }

    /// Position of this field in [`FeatureField::ALL`] and in `FeatureRow::values`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for FeatureField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureField::ALL
            .iter()
            .copied()
            .find(|field| field.column_name() == s.trim())
            .ok_or_else(|| format!("Unknown feature field '{}'", s))
    }
}

/// A candle extended with every [`FeatureField`], in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(flatten)]
    pub candle: Candle,
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureRow {
    pub fn new(candle: Candle, values: [f64; FEATURE_COUNT]) -> Self {
        Self { candle, values }
    }

    pub fn get(&self, field: FeatureField) -> f64 {
        self.values[field.index()]
    }

    pub fn close(&self) -> f64 {
        self.candle.close
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.candle.timestamp
    }
}
