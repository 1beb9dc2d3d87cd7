use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use shared::{Candle, Interval};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::source::CandleSource;
use crate::error::{EngineError, EngineResult};

const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

// Accepts RFC 3339 ("2024-03-01T00:00:00Z") or unix seconds.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| anyhow!("Timestamp '{}' is out of range", s));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to parse timestamp '{}': {}", s, e))
}

fn get_field<'a>(record: &'a StringRecord, headers: &StringRecord, name: &str, line: usize) -> Result<&'a str> {
    let pos = headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("Missing '{}' column", name))?;
    record
        .get(pos)
        .ok_or_else(|| anyhow!("Missing '{}' field in CSV record at line {}", name, line))
}

/// Reads `timestamp,open,high,low,close,volume` rows (header required, any column order).
/// An empty numeric cell reads as NaN so validation can report it.
pub fn load_candles_from_csv(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file '{}'", path.display()))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(BufReader::new(file));
    let headers = rdr.headers()?.clone();

    let mut candles = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| anyhow!("Error reading CSV record at line {}: {}", line, e))?;

        let timestamp = parse_timestamp(get_field(&record, &headers, COLUMNS[0], line)?)
            .with_context(|| format!("Error parsing 'timestamp' at line {}", line))?;
        let mut values = [0.0; 5];
        for (slot, name) in values.iter_mut().zip(&COLUMNS[1..]) {
            let raw = get_field(&record, &headers, name, line)?;
            *slot = if raw.is_empty() {
                f64::NAN
            } else {
                raw.parse::<f64>()
                    .map_err(|e| anyhow!("Error parsing '{}' at line {}: {}", name, line, e))?
            };
        }
        let [open, high, low, close, volume] = values;
        candles.push(Candle { timestamp, open, high, low, close, volume });
    }
    Ok(candles)
}

/// Offline source reading `<dir>/<SYMBOL>_<interval>.csv`, the same naming the
/// workbook export uses.
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", symbol.to_uppercase(), interval))
    }
}

#[async_trait]
impl CandleSource for CsvCandleSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(&self, symbol: &str, interval: Interval, limit: usize) -> EngineResult<Vec<Candle>> {
        let path = self.path_for(symbol, interval);
        if !path.exists() {
            return Err(EngineError::SymbolNotFound(format!("{} ({} not found)", symbol, path.display())));
        }
        let mut candles = tokio::task::spawn_blocking(move || load_candles_from_csv(&path))
            .await
            .map_err(|e| EngineError::ProcessingError(format!("CSV reader task failed: {}", e)))??;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        tracing::info!(symbol, %interval, rows = candles.len(), "Loaded candles from CSV");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn create_test_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_candles_from_csv_valid_data() {
        let csv_content = "\
timestamp,open,high,low,close,volume
2024-03-01T00:00:00Z,100.0,101.5,99.5,101.0,1200.5
1709254800,101.0,102.0,100.5,101.8,900";
        let tmp_file = create_test_csv(csv_content);
        let candles = load_candles_from_csv(tmp_file.path()).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, parse_timestamp("2024-03-01T00:00:00Z").unwrap());
        assert_eq!(candles[0].volume, 1200.5);
        assert_eq!(candles[1].timestamp.timestamp(), 1_709_254_800);
        assert_eq!(candles[1].close, 101.8);
    }

    #[test]
    fn test_load_candles_from_csv_empty_file() {
        let tmp_file = create_test_csv("timestamp,open,high,low,close,volume");
        assert!(load_candles_from_csv(tmp_file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_cell_reads_as_nan() {
        let tmp_file = create_test_csv("timestamp,open,high,low,close,volume\n1709254800,1,2,0.5,,10");
        let candles = load_candles_from_csv(tmp_file.path()).unwrap();
        assert!(candles[0].close.is_nan());
    }

    #[test]
    fn test_load_candles_from_csv_missing_column() {
        let tmp_file = create_test_csv("timestamp,open,high,low,close\n1709254800,1,2,0.5,1");
        let err = load_candles_from_csv(tmp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Missing 'volume' column"));
    }

    #[test]
    fn test_load_candles_from_csv_invalid_number() {
        let tmp_file = create_test_csv("timestamp,open,high,low,close,volume\n1709254800,abc,2,0.5,1,1");
        let err = load_candles_from_csv(tmp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Error parsing 'open'"));
    }

    #[tokio::test]
    async fn test_source_returns_latest_rows() {
        let dir = tempdir().unwrap();
        let mut body = String::from("timestamp,open,high,low,close,volume\n");
        for i in 0..5 {
            body.push_str(&format!("{},1,2,0.5,{},10\n", 1_709_254_800 + i * 3600, i));
        }
        std::fs::write(dir.path().join("BTC_1h.csv"), body).unwrap();

        let source = CsvCandleSource::new(dir.path());
        let candles = source.fetch("btc", Interval::Hour1, 3).await.unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].close, 2.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_symbol_not_found() {
        let dir = tempdir().unwrap();
        let err = CsvCandleSource::new(dir.path()).fetch("DOGE", Interval::Day1, 10).await.unwrap_err();
        assert!(matches!(err, EngineError::SymbolNotFound(_)));
    }
}
