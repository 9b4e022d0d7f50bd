//! CSV file data adapter.
//!
//! One file per symbol, `<base_path>/<symbol>.csv`, with a header row
//! naming `date,open,high,low,close,volume` in any order (case-insensitive).
//! Rows are sorted by date and duplicate dates collapse to the last row
//! before the series is handed to the domain.

use crate::domain::error::PipelineError;
use crate::domain::ohlcv::{PriceBar, PriceSeries};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const REQUIRED_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Parse CSV text into bars, restricted to `[start, end]`.
    pub fn parse_bars(
        content: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, PipelineError> {
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| PipelineError::data(format!("CSV header error: {}", e)))?
            .clone();

        let mut idx = [0usize; 6];
        for (slot, name) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| PipelineError::data(format!("missing required column '{}'", name)))?;
        }
        let [date_i, open_i, high_i, low_i, close_i, volume_i] = idx;

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record =
                result.map_err(|e| PipelineError::data(format!("CSV parse error: {}", e)))?;
            let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");

            let date = NaiveDate::parse_from_str(field(date_i), "%Y-%m-%d").map_err(|e| {
                PipelineError::data(format!("row {}: invalid date '{}': {}", row + 1, field(date_i), e))
            })?;
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }

            let number = |i: usize, name: &str| -> Result<f64, PipelineError> {
                field(i).parse::<f64>().map_err(|e| {
                    PipelineError::data(format!("row {}: invalid {} value: {}", row + 1, name, e))
                })
            };

            bars.push(PriceBar {
                date,
                open: number(open_i, "open")?,
                high: number(high_i, "high")?,
                low: number(low_i, "low")?,
                close: number(close_i, "close")?,
                volume: number(volume_i, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        let before = bars.len();
        // keep the last row for each date
        bars.reverse();
        bars.dedup_by_key(|b| b.date);
        bars.reverse();
        if bars.len() != before {
            warn!(dropped = before - bars.len(), "duplicate dates removed");
        }
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, PipelineError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })?;
        let bars = Self::parse_bars(&content, start, end)?;
        debug!(symbol, bars = bars.len(), "loaded price series");
        PriceSeries::new(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, PipelineError> {
        let entries = fs::read_dir(&self.base_path)?;
        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
