//! CSV bar loading.
//!
//! One file per symbol with a header row:
//! `timestamp,open,high,low,close,volume`. Timestamps are UTC, either
//! `%Y-%m-%d %H:%M:%S` or a bare `%Y-%m-%d` (midnight). Volume may be omitted.
//! Every file is checked for ordering, duplicates and OHLC sanity before any
//! run sees it.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use sophia_core::domain::Bar;
use sophia_core::engine::{validate_sequence, DataError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{symbol}: CSV error: {source}")]
    Csv { symbol: String, source: csv::Error },

    #[error("{symbol}: row {row}: unparseable timestamp '{value}'")]
    Timestamp {
        symbol: String,
        row: usize,
        value: String,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse either supported timestamp layout.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read and validate bars for `symbol` from any CSV reader.
pub fn read_bars<R: Read>(symbol: &str, reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            symbol: symbol.to_string(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            symbol: symbol.to_string(),
            // 1-based, counting the header.
            row: i + 2,
            value: row.timestamp.clone(),
        })?;
        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    validate_sequence(symbol, &bars)?;
    Ok(bars)
}

pub fn load_csv(symbol: &str, path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars(symbol, file)?;
    tracing::debug!(symbol, path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Bars for every symbol of a run, plus a content hash for provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedData {
    pub bars: BTreeMap<String, Vec<Bar>>,
    pub dataset_hash: String,
}

impl LoadedData {
    pub fn new(bars: BTreeMap<String, Vec<Bar>>) -> Self {
        let dataset_hash = dataset_hash(&bars);
        Self { bars, dataset_hash }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }
}

/// Load one CSV per `(symbol, path)` pair.
pub fn load_symbols(inputs: &[(String, PathBuf)]) -> Result<LoadedData, LoadError> {
    let mut bars = BTreeMap::new();
    for (symbol, path) in inputs {
        bars.insert(symbol.clone(), load_csv(symbol, path)?);
    }
    Ok(LoadedData::new(bars))
}

/// BLAKE3 over every bar in symbol order. Floats hash by bit pattern.
pub fn dataset_hash(bars: &BTreeMap<String, Vec<Bar>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (symbol, series) in bars {
        hasher.update(symbol.as_bytes());
        hasher.update(&(series.len() as u64).to_le_bytes());
        for bar in series {
            hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
