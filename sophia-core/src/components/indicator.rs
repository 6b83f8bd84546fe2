//! `Indicator` and the per-run series cache strategies read from.
//!
//! A run computes each declared indicator once over the whole bar history,
//! then strategies look up one index per bar.

use crate::domain::Bar;
use std::collections::BTreeMap;

/// A bar-history transform producing one `f64` per bar.
///
/// The output has the same length as `bars`. Positions without enough history
/// hold `f64::NAN`, never zero, and NaN in an input propagates forward.
///
/// Index t must only depend on `bars[..=t]`: evaluating a prefix and the full
/// history agree at every index of the prefix.
pub trait Indicator: Send + Sync {
    /// Cache key, e.g. `ema_9`, `atr_14`, `donchian_upper_20`.
    fn name(&self) -> &str;

    /// Leading positions that are always NaN.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Named series for one bar history, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorValues {
    series: BTreeMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Stored entry at `bar_index`, which may be NaN.
    pub fn raw(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series.get(name)?.get(bar_index).copied()
    }

    /// Defined entry at `bar_index`. Unknown names, indices past the end and
    /// warm-up NaNs all give `None`.
    pub fn value(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.raw(name, bar_index).filter(|v| !v.is_nan())
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Run each indicator over `bars`. A name already present is skipped, so
/// entry and exit channels of equal period share one series.
pub fn precompute_indicators(bars: &[Bar], indicators: &[Box<dyn Indicator>]) -> IndicatorValues {
    let mut values = IndicatorValues::new();
    for ind in indicators {
        if !values.contains(ind.name()) {
            values.insert(ind.name(), ind.compute(bars));
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, Ema, Sma};

    #[test]
    fn warmup_nan_is_not_a_value() {
        let mut values = IndicatorValues::new();
        let mut sma = vec![f64::NAN; 19];
        sma.extend([100.0, 101.0]);
        values.insert("sma_20", sma);

        assert!(values.raw("sma_20", 0).is_some_and(f64::is_nan));
        assert_eq!(values.value("sma_20", 0), None);
        assert_eq!(values.value("sma_20", 19), Some(100.0));
        assert_eq!(values.value("sma_20", 20), Some(101.0));
        assert_eq!(values.raw("sma_20", 21), None);
    }

    #[test]
    fn unknown_series_is_none() {
        let values = IndicatorValues::new();
        assert!(values.is_empty());
        assert_eq!(values.raw("ema_9", 0), None);
        assert_eq!(values.value("ema_9", 0), None);
        assert!(values.series("ema_9").is_none());
    }

    #[test]
    fn repeated_names_computed_once() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let indicators: Vec<Box<dyn Indicator>> =
            vec![Box::new(Sma::new(2)), Box::new(Ema::new(3)), Box::new(Sma::new(2))];
        let values = precompute_indicators(&bars, &indicators);
        assert_eq!(values.len(), 2);
        assert_eq!(values.series("sma_2").map(<[f64]>::len), Some(4));
        assert_eq!(values.value("ema_3", 2), Some(2.0));
    }
}
