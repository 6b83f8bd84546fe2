//! Donchian Channel: highest high / lowest low over a trailing window.
//!
//! Two series, exposed as separate Indicator instances:
//! - Upper: max(high[t-period+1..=t])
//! - Lower: min(low[t-period+1..=t])
//!
//! The window includes bar t. Breakout rules compare a close against the
//! channel value at t-1 so the breakout bar never sits inside its own window.
//! Lookback: period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

/// Which band of the Donchian channel to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonchianBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Donchian {
    period: usize,
    band: DonchianBand,
    name: String,
}

impl Donchian {
    pub fn upper(period: usize) -> Self {
        Self::new(period, DonchianBand::Upper)
    }

    pub fn lower(period: usize) -> Self {
        Self::new(period, DonchianBand::Lower)
    }

    fn new(period: usize, band: DonchianBand) -> Self {
        assert!(period >= 1, "Donchian period must be >= 1");
        let label = match band {
            DonchianBand::Upper => "upper",
            DonchianBand::Lower => "lower",
        };
        Self {
            period,
            band,
            name: format!("donchian_{label}_{period}"),
        }
    }
}

impl Indicator for Donchian {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let window = &bars[i + 1 - self.period..=i];
            let extreme = match self.band {
                DonchianBand::Upper => window
                    .iter()
                    .map(|b| b.high)
                    .try_fold(f64::NEG_INFINITY, |acc, h| (!h.is_nan()).then(|| acc.max(h))),
                DonchianBand::Lower => window
                    .iter()
                    .map(|b| b.low)
                    .try_fold(f64::INFINITY, |acc, l| (!l.is_nan()).then(|| acc.min(l))),
            };
            if let Some(v) = extreme {
                result[i] = v;
            }
        }
        result
    }
}
