// Tabular export of feature rows: one CSV sheet per interval.
use csv::Writer;
use shared::{FeatureField, FeatureRow, Interval, PipelineResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

/// Header plus stringified rows: timestamp, OHLCV, then every feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn to_table(features: &[FeatureRow]) -> FeatureTable {
    let mut headers: Vec<String> = ["timestamp", "open", "high", "low", "close", "volume"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend(FeatureField::ALL.iter().map(|f| f.column_name().to_string()));

    let rows = features
        .iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(headers.len());
            cells.push(row.timestamp().to_rfc3339());
            cells.extend(row.candle.ohlcv().iter().map(|(_, v)| v.to_string()));
            cells.extend(row.values.iter().map(|v| v.to_string()));
            cells
        })
        .collect();
    FeatureTable { headers, rows }
}

pub fn sheet_name(symbol: &str, interval: Interval) -> String {
    format!("{}_{}", symbol.to_uppercase(), interval)
}

fn write_sheet(path: &Path, table: &FeatureTable) -> EngineResult<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `<dir>/<SYMBOL>_<interval>.csv` for every successful result and
/// returns the written paths. Failed intervals have no sheet.
pub fn write_workbook(
    dir: &Path,
    symbol: &str,
    results: &BTreeMap<Interval, PipelineResult>,
) -> EngineResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .map_err(|e| EngineError::ExportError(format!("cannot create '{}': {}", dir.display(), e)))?;

    let mut written = Vec::new();
    for (interval, result) in results {
        if !result.is_success() {
            tracing::debug!(symbol, %interval, "Skipping failed interval in export");
            continue;
        }
        let path = dir.join(format!("{}.csv", sheet_name(symbol, *interval)));
        write_sheet(&path, &to_table(&result.features))
            .map_err(|e| EngineError::ExportError(format!("writing '{}': {}", path.display(), e)))?;
        written.push(path);
    }
    tracing::info!(symbol, sheets = written.len(), dir = %dir.display(), "Exported feature workbook");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::csv_source::load_candles_from_csv;
    use crate::indicators::IndicatorEngine;
    use crate::validation::tests::hourly_series;
    use crate::validation::validate;
    use shared::{ErrorKind, PipelineFailure, FEATURE_COUNT};
    use tempfile::tempdir;

    fn features() -> Vec<FeatureRow> {
        let series = validate(hourly_series(60)).unwrap();
        IndicatorEngine::default().compute(&series).unwrap()
    }

    #[test]
    fn test_table_has_timestamp_and_every_field() {
        let table = to_table(&features());
        assert_eq!(table.headers.len(), 6 + FEATURE_COUNT);
        assert_eq!(table.headers[0], "timestamp");
        assert_eq!(table.headers[6], "trend_sma_fast");
        assert_eq!(table.rows.len(), 60);
        assert!(table.rows.iter().all(|r| r.len() == table.headers.len()));
    }

    #[test]
    fn test_workbook_keyed_by_interval() {
        let dir = tempdir().unwrap();
        let mut results = BTreeMap::new();
        results.insert(Interval::Hour1, PipelineResult::success(Interval::Hour1, features(), 1.0));
        results.insert(
            Interval::Day1,
            PipelineResult::failure(Interval::Day1, PipelineFailure::new(ErrorKind::Network, "down")),
        );

        let written = write_workbook(dir.path(), "btc", &results).unwrap();
        assert_eq!(written, vec![dir.path().join("BTC_1h.csv")]);

        // The sheet reads back as candles through the CSV source.
        let candles = load_candles_from_csv(&written[0]).unwrap();
        assert_eq!(candles.len(), 60);
        assert_eq!(candles, hourly_series(60));
    }

    #[test]
    fn test_unwritable_dir_is_export_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_workbook(&blocker.join("sub"), "BTC", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::ExportError(_)));
    }
}
