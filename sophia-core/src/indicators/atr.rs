//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! TR[0] is undefined (no previous close).
//! ATR uses Wilder smoothing (alpha = 1/period) seeded with the mean of the
//! first `period` true ranges. Lookback: period.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::sma::sma_of_series;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}

/// True Range series. Index 0 is NaN.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for (i, pair) in bars.windows(2).enumerate() {
        let (prev, bar) = (&pair[0], &pair[1]);
        let pc = prev.close;
        // f64::max drops NaN operands, so check inputs explicitly.
        if bar.high.is_nan() || bar.low.is_nan() || pc.is_nan() {
            continue;
        }
        tr[i + 1] = (bar.high - bar.low)
            .max((bar.high - pc).abs())
            .max((bar.low - pc).abs());
    }
    tr
}

/// Wilder smoothing. Seeds with the mean of the first `period` values after
/// any leading NaNs; a later NaN taints the rest of the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    let seed_end = start + period;
    if seed_end > n {
        return result;
    }
    let seed_window = &values[start..seed_end];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }

    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Simple average of ATR over `window` bars. The breakout volatility filter
/// compares current ATR against this baseline.
///
/// Lookback: atr_period + window - 1.
#[derive(Debug, Clone)]
pub struct AtrAverage {
    atr: Atr,
    window: usize,
    name: String,
}

impl AtrAverage {
    pub fn new(atr_period: usize, window: usize) -> Self {
        assert!(window >= 1, "ATR average window must be >= 1");
        Self {
            atr: Atr::new(atr_period),
            window,
            name: format!("atr_avg_{atr_period}_{window}"),
        }
    }
}

impl Indicator for AtrAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.atr.lookback() + self.window - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        sma_of_series(&self.atr.compute(bars), self.window)
    }
}
