// CryptoCompare histo* REST adapter.
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shared::{Candle, Interval};
use std::time::Duration;

use super::source::CandleSource;
use crate::config::SourceSettings;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Deserialize)]
struct HistoResponse {
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Option<serde_json::Value>,
}

/// Price and volume may come back as `null`; they become NaN so that
/// validation reports them as null values.
#[derive(Debug, Deserialize)]
struct HistoBar {
    time: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volumefrom: Option<f64>,
}

/// Endpoint and `aggregate` factor for an interval.
pub fn endpoint_for(interval: Interval) -> (&'static str, u32) {
    match interval {
        Interval::Minute1 => ("histominute", 1),
        Interval::Minute5 => ("histominute", 5),
        Interval::Minute15 => ("histominute", 15),
        Interval::Minute30 => ("histominute", 30),
        Interval::Hour1 => ("histohour", 1),
        Interval::Hour4 => ("histohour", 4),
        Interval::Day1 => ("histoday", 1),
    }
}

fn classify_api_error(symbol: &str, message: &str) -> EngineError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") {
        EngineError::RateLimited { retry_after: None }
    } else if lower.contains("no data") || lower.contains("does not exist") || lower.contains("fsym") {
        EngineError::SymbolNotFound(format!("{}: {}", symbol, message))
    } else {
        EngineError::NetworkError(format!("upstream error: {}", message))
    }
}

/// Parses a histo* response body into candles.
pub fn parse_histo_response(symbol: &str, body: &str) -> EngineResult<Vec<Candle>> {
    let response: HistoResponse = serde_json::from_str(body)?;
    if response.response.eq_ignore_ascii_case("error") {
        return Err(classify_api_error(symbol, &response.message));
    }

    let bars = response
        .data
        .as_ref()
        .and_then(|data| data.get("Data"))
        .filter(|bars| bars.is_array())
        .ok_or_else(|| EngineError::SchemaError("response has no Data.Data array".to_string()))?;
    let bars: Vec<HistoBar> = serde_json::from_value(bars.clone())?;
    if bars.is_empty() {
        tracing::warn!(symbol, "CryptoCompare returned no bars");
    }

    bars.into_iter()
        .map(|bar| {
            let timestamp = Utc
                .timestamp_opt(bar.time, 0)
                .single()
                .ok_or_else(|| EngineError::SchemaError(format!("invalid bar time {}", bar.time)))?;
            Ok(Candle {
                timestamp,
                open: bar.open.unwrap_or(f64::NAN),
                high: bar.high.unwrap_or(f64::NAN),
                low: bar.low.unwrap_or(f64::NAN),
                close: bar.close.unwrap_or(f64::NAN),
                volume: bar.volumefrom.unwrap_or(f64::NAN),
            })
        })
        .collect()
}

pub struct CryptoCompareSource {
    client: Client,
    settings: SourceSettings,
    api_key: Option<String>,
}

impl CryptoCompareSource {
    pub fn new(settings: SourceSettings, api_key: Option<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings, api_key })
    }

    fn url(&self, interval: Interval) -> String {
        let (endpoint, _) = endpoint_for(interval);
        format!("{}/data/v2/{}", self.settings.base_url.trim_end_matches('/'), endpoint)
    }

    /// Query string pairs, without the API key.
    fn query(&self, symbol: &str, interval: Interval, limit: usize) -> Vec<(&'static str, String)> {
        let (_, aggregate) = endpoint_for(interval);
        vec![
            ("fsym", symbol.to_uppercase()),
            ("tsym", self.settings.quote_currency.clone()),
            ("limit", limit.to_string()),
            ("aggregate", aggregate.to_string()),
            ("e", self.settings.exchange.clone()),
        ]
    }
}

#[async_trait]
impl CandleSource for CryptoCompareSource {
    fn name(&self) -> &str {
        "cryptocompare"
    }

    async fn fetch(&self, symbol: &str, interval: Interval, limit: usize) -> EngineResult<Vec<Candle>> {
        let url = self.url(interval);
        let mut query = self.query(symbol, interval, limit);
        tracing::debug!(%url, ?query, "Requesting candles");
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            tracing::warn!(symbol, %interval, ?retry_after, "CryptoCompare rate limit hit");
            return Err(EngineError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(EngineError::NetworkError(format!("HTTP {} from {}", status, url)));
        }

        let body = response.text().await?;
        let mut candles = parse_histo_response(symbol, &body)?;
        // histo* returns limit + 1 bars.
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        tracing::info!(symbol, %interval, rows = candles.len(), "Fetched candles from CryptoCompare");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;

    const SUCCESS: &str = r#"{
        "Response": "Success", "Message": "", "HasWarning": false, "Type": 100,
        "Data": {"Aggregated": false, "TimeFrom": 1700000000, "TimeTo": 1700003600, "Data": [
            {"time": 1700000000, "high": 37100.5, "low": 36900.0, "open": 37000.0, "volumefrom": 12.5, "volumeto": 462000.0, "close": 37050.0, "conversionType": "direct", "conversionSymbol": ""},
            {"time": 1700003600, "high": 37200.0, "low": 37000.0, "open": 37050.0, "volumefrom": 8.25, "volumeto": 306000.0, "close": 37150.0, "conversionType": "direct", "conversionSymbol": ""}
        ]}
    }"#;

    #[test]
    fn test_parse_success_maps_fields() {
        let candles = parse_histo_response("BTC", SUCCESS).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(candles[0].open, 37000.0);
        assert_eq!(candles[0].volume, 12.5);
        assert_eq!(candles[1].close, 37150.0);
    }

    #[test]
    fn test_rate_limit_message() {
        let body = r#"{"Response":"Error","Message":"You are over your rate limit please upgrade your account!","Data":{}}"#;
        assert!(parse_histo_response("BTC", body).unwrap_err().is_rate_limited());
    }

    #[test]
    fn test_unknown_symbol_message() {
        let body = r#"{"Response":"Error","Message":"cccagg_or_exchange market does not exist for this coin pair (NOPE-USDT)","Data":{}}"#;
        assert!(matches!(parse_histo_response("NOPE", body), Err(EngineError::SymbolNotFound(_))));
    }

    #[test]
    fn test_missing_data_is_schema_error() {
        let body = r#"{"Response":"Success","Message":"","Data":{}}"#;
        assert!(matches!(parse_histo_response("BTC", body), Err(EngineError::SchemaError(_))));
        assert!(matches!(parse_histo_response("BTC", "not json"), Err(EngineError::SchemaError(_))));
    }

    #[test]
    fn test_null_price_is_left_to_validation() {
        let body = r#"{"Response":"Success","Message":"","Data":{"Data":[
            {"time": 1700000000, "high": 2.0, "low": 1.0, "open": 1.5, "volumefrom": 3.0, "close": null}
        ]}}"#;
        let candles = parse_histo_response("BTC", body).unwrap();
        assert!(candles[0].close.is_nan());
        assert_eq!(candles[0].open, 1.5);
        match validate(candles) {
            Err(EngineError::NullValue { index, field }) => {
                assert_eq!(index, 0);
                assert_eq!(field, "close");
            }
            other => panic!("expected NullValue, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_bars_are_left_to_validation() {
        let body = r#"{"Response":"Success","Message":"","Data":{"Data":[]}}"#;
        let candles = parse_histo_response("BTC", body).unwrap();
        assert!(candles.is_empty());
        assert_eq!(validate(candles).unwrap_err().kind(), shared::ErrorKind::EmptySeries);
    }

    #[test]
    fn test_endpoints_aggregate_per_interval() {
        assert_eq!(endpoint_for(Interval::Minute15), ("histominute", 15));
        assert_eq!(endpoint_for(Interval::Hour4), ("histohour", 4));
        assert_eq!(endpoint_for(Interval::Day1), ("histoday", 1));
    }

    #[test]
    fn test_query_omits_api_key() {
        let source = CryptoCompareSource::new(SourceSettings::default(), Some("secret".into())).unwrap();
        let query = source.query("eth", Interval::Minute5, 120);
        assert!(query.iter().all(|(k, _)| *k != "api_key"));
        assert!(query.contains(&("fsym", "ETH".to_string())));
        assert!(query.contains(&("aggregate", "5".to_string())));
        assert_eq!(source.url(Interval::Hour1), "https://min-api.cryptocompare.com/data/v2/histohour");
    }
}
