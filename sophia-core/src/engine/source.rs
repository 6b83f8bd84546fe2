//! Bar sources: the pull interface shared by historical archives and live feeds.

use chrono::NaiveDateTime;
use std::collections::VecDeque;
use thiserror::Error;

use crate::domain::Bar;

/// Data errors are fatal for the run that hits them.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("{symbol}: timestamp {current} is before {previous}")]
    NonMonotonic {
        symbol: String,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("{symbol}: duplicate bar at {timestamp}")]
    Duplicate {
        symbol: String,
        timestamp: NaiveDateTime,
    },

    #[error("expected bars for '{expected}', got '{got}'")]
    SymbolMismatch { expected: String, got: String },

    #[error("{symbol}: malformed bar at {timestamp}")]
    Malformed {
        symbol: String,
        timestamp: NaiveDateTime,
    },

    #[error("no bars for '{0}'")]
    Empty(String),
}

/// Synchronous pull of the next bar for one symbol. `Ok(None)` means exhausted.
pub trait BarSource {
    fn symbol(&self) -> &str;

    fn next_bar(&mut self) -> Result<Option<Bar>, DataError>;
}

/// Check one bar against its predecessor in the same series.
pub fn check_next(symbol: &str, previous: Option<&Bar>, bar: &Bar) -> Result<(), DataError> {
    if bar.symbol != symbol {
        return Err(DataError::SymbolMismatch {
            expected: symbol.to_string(),
            got: bar.symbol.clone(),
        });
    }
    if !bar.is_sane() {
        return Err(DataError::Malformed {
            symbol: symbol.to_string(),
            timestamp: bar.timestamp,
        });
    }
    if let Some(prev) = previous {
        if bar.timestamp == prev.timestamp {
            return Err(DataError::Duplicate {
                symbol: symbol.to_string(),
                timestamp: bar.timestamp,
            });
        }
        if bar.timestamp < prev.timestamp {
            return Err(DataError::NonMonotonic {
                symbol: symbol.to_string(),
                previous: prev.timestamp,
                current: bar.timestamp,
            });
        }
    }
    Ok(())
}

/// Validate a whole series up front.
pub fn validate_sequence(symbol: &str, bars: &[Bar]) -> Result<(), DataError> {
    if bars.is_empty() {
        return Err(DataError::Empty(symbol.to_string()));
    }
    let mut previous = None;
    for bar in bars {
        check_next(symbol, previous, bar)?;
        previous = Some(bar);
    }
    Ok(())
}

/// In-memory bar archive replayed in order. Each bar is checked as it is pulled.
#[derive(Debug, Clone)]
pub struct HistoricalBars {
    symbol: String,
    pending: VecDeque<Bar>,
    last: Option<Bar>,
}

impl HistoricalBars {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            pending: bars.into(),
            last: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl BarSource for HistoricalBars {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, DataError> {
        let Some(bar) = self.pending.pop_front() else {
            return Ok(None);
        };
        check_next(&self.symbol, self.last.as_ref(), &bar)?;
        self.last = Some(bar.clone());
        Ok(Some(bar))
    }
}

/// Drain a source into a validated series.
pub fn drain(source: &mut dyn BarSource) -> Result<Vec<Bar>, DataError> {
    let mut bars = Vec::new();
    while let Some(bar) = source.next_bar()? {
        bars.push(bar);
    }
    if bars.is_empty() {
        return Err(DataError::Empty(source.symbol().to_string()));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn replays_in_order() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let mut src = HistoricalBars::new("TEST", bars.clone());
        assert_eq!(src.next_bar().unwrap(), Some(bars[0].clone()));
        assert_eq!(src.remaining(), 2);
        assert_eq!(drain(&mut src).unwrap(), bars[1..].to_vec());
        assert_eq!(src.next_bar().unwrap(), None);
    }

    #[test]
    fn rejects_duplicates_and_reversals() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].timestamp = bars[1].timestamp;
        assert!(matches!(
            validate_sequence("TEST", &bars),
            Err(DataError::Duplicate { .. })
        ));

        bars[2].timestamp = bars[0].timestamp;
        let mut src = HistoricalBars::new("TEST", bars);
        src.next_bar().unwrap();
        src.next_bar().unwrap();
        assert!(matches!(
            src.next_bar(),
            Err(DataError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn rejects_foreign_symbol_and_empty() {
        let bars = make_bars(&[1.0]);
        assert!(matches!(
            validate_sequence("EURUSD", &bars),
            Err(DataError::SymbolMismatch { .. })
        ));
        assert_eq!(
            validate_sequence("TEST", &[]),
            Err(DataError::Empty("TEST".into()))
        );
        let mut empty = HistoricalBars::new("TEST", Vec::new());
        assert_eq!(drain(&mut empty), Err(DataError::Empty("TEST".into())));
    }

    #[test]
    fn rejects_malformed_bar() {
        let mut bars = make_bars(&[1.0, 2.0]);
        bars[1].high = bars[1].low - 1.0;
        assert!(matches!(
            validate_sequence("TEST", &bars),
            Err(DataError::Malformed { .. })
        ));
    }
}
