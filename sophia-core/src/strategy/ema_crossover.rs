//! EMA crossover with MACD histogram and RSI confirmation.
//!
//! Entry requires a fresh fast/slow EMA cross, a histogram on the same side of
//! zero, and RSI strictly inside the (lower, upper) band. Exits fire on the
//! opposite cross or when RSI falls back through the band edge it had reached.

use serde::{Deserialize, Serialize};

use crate::components::{Indicator, IndicatorValues, Signal};
use crate::domain::{Bar, PositionSide};
use crate::indicators::{Atr, Ema, Macd, Rsi};
use crate::params::{ConfigError, ParameterDomain, ParameterSet};

use super::{crossed_above, crossed_below, PositionState, Strategy};

const STRATEGY: &str = "ema_crossover";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmaCrossoverParams {
    pub fast_ema: usize,
    pub slow_ema: usize,
    pub signal_ema: usize,
    pub rsi_period: usize,
    pub rsi_upper: f64,
    pub rsi_lower: f64,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub profit_multiplier: f64,
}

impl Default for EmaCrossoverParams {
    fn default() -> Self {
        Self {
            fast_ema: 9,
            slow_ema: 21,
            signal_ema: 5,
            rsi_period: 14,
            rsi_upper: 70.0,
            rsi_lower: 30.0,
            atr_period: 14,
            atr_multiplier: 2.0,
            profit_multiplier: 3.0,
        }
    }
}

impl EmaCrossoverParams {
    pub fn domains() -> Vec<ParameterDomain> {
        vec![
            ParameterDomain::int("fast_ema", 1, 200),
            ParameterDomain::int("slow_ema", 2, 400),
            ParameterDomain::int("signal_ema", 1, 100),
            ParameterDomain::int("rsi_period", 2, 100),
            ParameterDomain::float("rsi_upper", 50.0, 100.0),
            ParameterDomain::float("rsi_lower", 0.0, 50.0),
            ParameterDomain::int("atr_period", 1, 200),
            ParameterDomain::float("atr_multiplier", 0.1, 10.0),
            ParameterDomain::float("profit_multiplier", 0.1, 20.0),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_parameter_set().validate(STRATEGY, &Self::domains())?;
        if self.fast_ema >= self.slow_ema {
            return Err(ConfigError::InvalidCombination(format!(
                "fast_ema ({}) must be below slow_ema ({})",
                self.fast_ema, self.slow_ema
            )));
        }
        if self.rsi_lower >= self.rsi_upper {
            return Err(ConfigError::InvalidCombination(format!(
                "rsi_lower ({}) must be below rsi_upper ({})",
                self.rsi_lower, self.rsi_upper
            )));
        }
        Ok(())
    }

    pub fn to_parameter_set(&self) -> ParameterSet {
        ParameterSet::new()
            .with("fast_ema", self.fast_ema)
            .with("slow_ema", self.slow_ema)
            .with("signal_ema", self.signal_ema)
            .with("rsi_period", self.rsi_period)
            .with("rsi_upper", self.rsi_upper)
            .with("rsi_lower", self.rsi_lower)
            .with("atr_period", self.atr_period)
            .with("atr_multiplier", self.atr_multiplier)
            .with("profit_multiplier", self.profit_multiplier)
    }

    pub fn from_parameter_set(ps: &ParameterSet) -> Result<Self, ConfigError> {
        ps.validate(STRATEGY, &Self::domains())?;
        let d = Self::default();
        let params = Self {
            fast_ema: ps.usize_param("fast_ema")?.unwrap_or(d.fast_ema),
            slow_ema: ps.usize_param("slow_ema")?.unwrap_or(d.slow_ema),
            signal_ema: ps.usize_param("signal_ema")?.unwrap_or(d.signal_ema),
            rsi_period: ps.usize_param("rsi_period")?.unwrap_or(d.rsi_period),
            rsi_upper: ps.f64_param("rsi_upper")?.unwrap_or(d.rsi_upper),
            rsi_lower: ps.f64_param("rsi_lower")?.unwrap_or(d.rsi_lower),
            atr_period: ps.usize_param("atr_period")?.unwrap_or(d.atr_period),
            atr_multiplier: ps.f64_param("atr_multiplier")?.unwrap_or(d.atr_multiplier),
            profit_multiplier: ps
                .f64_param("profit_multiplier")?
                .unwrap_or(d.profit_multiplier),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Trend-following EMA crossover strategy.
#[derive(Debug, Clone)]
pub struct EmaCrossover {
    params: EmaCrossoverParams,
    fast_key: String,
    slow_key: String,
    hist_key: String,
    rsi_key: String,
    atr_key: String,
}

/// Indicator readings at the current and previous bar.
struct Snapshot {
    fast_prev: f64,
    slow_prev: f64,
    fast: f64,
    slow: f64,
    rsi_prev: f64,
    rsi: f64,
    hist: f64,
    atr: f64,
}

impl EmaCrossover {
    pub fn new(params: EmaCrossoverParams) -> Self {
        let (f, s, g) = (params.fast_ema, params.slow_ema, params.signal_ema);
        Self {
            fast_key: format!("ema_{f}"),
            slow_key: format!("ema_{s}"),
            hist_key: format!("macd_hist_{f}_{s}_{g}"),
            rsi_key: format!("rsi_{}", params.rsi_period),
            atr_key: format!("atr_{}", params.atr_period),
            params,
        }
    }

    pub fn params(&self) -> &EmaCrossoverParams {
        &self.params
    }

    fn snapshot(&self, iv: &IndicatorValues, i: usize) -> Option<Snapshot> {
        Some(Snapshot {
            fast_prev: iv.value(&self.fast_key, i - 1)?,
            slow_prev: iv.value(&self.slow_key, i - 1)?,
            fast: iv.value(&self.fast_key, i)?,
            slow: iv.value(&self.slow_key, i)?,
            rsi_prev: iv.value(&self.rsi_key, i - 1)?,
            rsi: iv.value(&self.rsi_key, i)?,
            hist: iv.value(&self.hist_key, i)?,
            atr: iv.value(&self.atr_key, i)?,
        })
    }

    fn rsi_in_band(&self, rsi: f64) -> bool {
        rsi > self.params.rsi_lower && rsi < self.params.rsi_upper
    }
}

impl Strategy for EmaCrossover {
    fn name(&self) -> &str {
        STRATEGY
    }

    fn warmup_bars(&self) -> usize {
        let p = &self.params;
        p.slow_ema
            .max(p.slow_ema + p.signal_ema - 2)
            .max(p.rsi_period + 1)
            .max(p.atr_period)
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        let p = &self.params;
        vec![
            Box::new(Ema::new(p.fast_ema)),
            Box::new(Ema::new(p.slow_ema)),
            Box::new(Macd::histogram(p.fast_ema, p.slow_ema, p.signal_ema)),
            Box::new(Rsi::new(p.rsi_period)),
            Box::new(Atr::new(p.atr_period)),
        ]
    }

    fn evaluate(
        &self,
        bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: Option<&PositionState>,
    ) -> Signal {
        let bar = &bars[bar_index];
        if bar_index < self.warmup_bars() {
            return Signal::flat(bar, bar_index, "warmup");
        }
        if bar.close.is_nan() {
            return Signal::flat(bar, bar_index, "invalid bar");
        }
        let Some(s) = self.snapshot(indicators, bar_index) else {
            return Signal::flat(bar, bar_index, "indicator undefined");
        };

        let cross_up = crossed_above(s.fast_prev, s.slow_prev, s.fast, s.slow);
        let cross_down = crossed_below(s.fast_prev, s.slow_prev, s.fast, s.slow);
        let p = &self.params;

        if let Some(pos) = position {
            let exit = match pos.side {
                PositionSide::Long if cross_down => Some("bearish cross"),
                PositionSide::Long if s.rsi_prev >= p.rsi_upper && s.rsi < p.rsi_upper => {
                    Some("rsi overbought reversal")
                }
                PositionSide::Short if cross_up => Some("bullish cross"),
                PositionSide::Short if s.rsi_prev <= p.rsi_lower && s.rsi > p.rsi_lower => {
                    Some("rsi oversold reversal")
                }
                _ => None,
            };
            return match exit {
                Some(reason) => Signal::exit(bar, bar_index, reason).with_metadata("rsi", s.rsi),
                None => Signal::flat(bar, bar_index, "hold"),
            };
        }

        let side = if cross_up && s.hist > 0.0 && self.rsi_in_band(s.rsi) {
            PositionSide::Long
        } else if cross_down && s.hist < 0.0 && self.rsi_in_band(s.rsi) {
            PositionSide::Short
        } else {
            return Signal::flat(bar, bar_index, "no crossover");
        };

        let risk_unit = s.atr * p.atr_multiplier;
        if risk_unit <= 0.0 {
            return Signal::flat(bar, bar_index, "zero volatility");
        }
        let reason = match side {
            PositionSide::Long => "bullish ema cross",
            PositionSide::Short => "bearish ema cross",
        };
        Signal::entry(bar, bar_index, side, risk_unit, p.profit_multiplier, reason)
            .with_metadata("fast_ema", s.fast)
            .with_metadata("slow_ema", s.slow)
            .with_metadata("macd_hist", s.hist)
            .with_metadata("rsi", s.rsi)
            .with_metadata("atr", s.atr)
    }
}
