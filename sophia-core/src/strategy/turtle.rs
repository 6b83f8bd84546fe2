//! Turtle breakout: Donchian channel entries and exits with ATR-scaled levels.
//!
//! Long when close breaks above the prior bar's entry-period upper channel,
//! short when it breaks below the prior bar's lower channel. An open long exits
//! when close falls below the prior bar's exit-period lower channel (mirrored
//! for shorts). Optional volatility and trend filters gate entries only.

use serde::{Deserialize, Serialize};

use crate::components::{Indicator, IndicatorValues, Signal};
use crate::domain::{Bar, PositionSide};
use crate::indicators::{Atr, AtrAverage, Donchian, Sma};
use crate::params::{ConfigError, ParameterDomain, ParameterSet};

use super::{PositionState, Strategy};

const STRATEGY: &str = "turtle";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurtleParams {
    pub entry_period: usize,
    pub exit_period: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub profit_multiplier: f64,
    pub use_vol_filter: bool,
    pub vol_lookback: usize,
    pub vol_threshold: f64,
    pub use_trend_filter: bool,
    pub trend_period: usize,
}

impl Default for TurtleParams {
    fn default() -> Self {
        Self {
            entry_period: 20,
            exit_period: 10,
            atr_period: 14,
            atr_multiplier: 2.0,
            profit_multiplier: 2.0,
            use_vol_filter: false,
            vol_lookback: 100,
            vol_threshold: 1.2,
            use_trend_filter: false,
            trend_period: 200,
        }
    }
}

impl TurtleParams {
    pub fn domains() -> Vec<ParameterDomain> {
        vec![
            ParameterDomain::int("entry_period", 2, 400),
            ParameterDomain::int("exit_period", 2, 400),
            ParameterDomain::int("atr_period", 1, 200),
            ParameterDomain::float("atr_multiplier", 0.1, 10.0),
            ParameterDomain::float("profit_multiplier", 0.1, 20.0),
            ParameterDomain::boolean("use_vol_filter"),
            ParameterDomain::int("vol_lookback", 2, 1000),
            ParameterDomain::float("vol_threshold", 0.1, 10.0),
            ParameterDomain::boolean("use_trend_filter"),
            ParameterDomain::int("trend_period", 2, 1000),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_parameter_set().validate(STRATEGY, &Self::domains())
    }

    pub fn to_parameter_set(&self) -> ParameterSet {
        ParameterSet::new()
            .with("entry_period", self.entry_period)
            .with("exit_period", self.exit_period)
            .with("atr_period", self.atr_period)
            .with("atr_multiplier", self.atr_multiplier)
            .with("profit_multiplier", self.profit_multiplier)
            .with("use_vol_filter", self.use_vol_filter)
            .with("vol_lookback", self.vol_lookback)
            .with("vol_threshold", self.vol_threshold)
            .with("use_trend_filter", self.use_trend_filter)
            .with("trend_period", self.trend_period)
    }

    pub fn from_parameter_set(ps: &ParameterSet) -> Result<Self, ConfigError> {
        ps.validate(STRATEGY, &Self::domains())?;
        let d = Self::default();
        let params = Self {
            entry_period: ps.usize_param("entry_period")?.unwrap_or(d.entry_period),
            exit_period: ps.usize_param("exit_period")?.unwrap_or(d.exit_period),
            atr_period: ps.usize_param("atr_period")?.unwrap_or(d.atr_period),
            atr_multiplier: ps.f64_param("atr_multiplier")?.unwrap_or(d.atr_multiplier),
            profit_multiplier: ps
                .f64_param("profit_multiplier")?
                .unwrap_or(d.profit_multiplier),
            use_vol_filter: ps.bool_param("use_vol_filter")?.unwrap_or(d.use_vol_filter),
            vol_lookback: ps.usize_param("vol_lookback")?.unwrap_or(d.vol_lookback),
            vol_threshold: ps.f64_param("vol_threshold")?.unwrap_or(d.vol_threshold),
            use_trend_filter: ps
                .bool_param("use_trend_filter")?
                .unwrap_or(d.use_trend_filter),
            trend_period: ps.usize_param("trend_period")?.unwrap_or(d.trend_period),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Donchian channel breakout strategy.
#[derive(Debug, Clone)]
pub struct TurtleBreakout {
    params: TurtleParams,
    entry_upper: String,
    entry_lower: String,
    exit_upper: String,
    exit_lower: String,
    atr_key: String,
    atr_avg_key: String,
    trend_key: String,
}

impl TurtleBreakout {
    pub fn new(params: TurtleParams) -> Self {
        Self {
            entry_upper: format!("donchian_upper_{}", params.entry_period),
            entry_lower: format!("donchian_lower_{}", params.entry_period),
            exit_upper: format!("donchian_upper_{}", params.exit_period),
            exit_lower: format!("donchian_lower_{}", params.exit_period),
            atr_key: format!("atr_{}", params.atr_period),
            atr_avg_key: format!("atr_avg_{}_{}", params.atr_period, params.vol_lookback),
            trend_key: format!("sma_{}", params.trend_period),
            params,
        }
    }

    pub fn params(&self) -> &TurtleParams {
        &self.params
    }

    fn evaluate_exit(
        &self,
        bar: &Bar,
        bar_index: usize,
        indicators: &IndicatorValues,
        side: PositionSide,
    ) -> Signal {
        let prev = bar_index - 1;
        match side {
            PositionSide::Long => match indicators.value(&self.exit_lower, prev) {
                Some(lower) if bar.close < lower => {
                    Signal::exit(bar, bar_index, "exit channel broken").with_metadata("channel", lower)
                }
                Some(_) => Signal::flat(bar, bar_index, "hold"),
                None => Signal::flat(bar, bar_index, "indicator undefined"),
            },
            PositionSide::Short => match indicators.value(&self.exit_upper, prev) {
                Some(upper) if bar.close > upper => {
                    Signal::exit(bar, bar_index, "exit channel broken").with_metadata("channel", upper)
                }
                Some(_) => Signal::flat(bar, bar_index, "hold"),
                None => Signal::flat(bar, bar_index, "indicator undefined"),
            },
        }
    }

    fn evaluate_entry(&self, bar: &Bar, bar_index: usize, indicators: &IndicatorValues) -> Signal {
        let prev = bar_index - 1;
        let (Some(upper), Some(lower), Some(atr)) = (
            indicators.value(&self.entry_upper, prev),
            indicators.value(&self.entry_lower, prev),
            indicators.value(&self.atr_key, bar_index),
        ) else {
            return Signal::flat(bar, bar_index, "indicator undefined");
        };

        let (side, channel) = if bar.close > upper {
            (PositionSide::Long, upper)
        } else if bar.close < lower {
            (PositionSide::Short, lower)
        } else {
            return Signal::flat(bar, bar_index, "no breakout");
        };

        if self.params.use_vol_filter {
            match indicators.value(&self.atr_avg_key, bar_index) {
                Some(avg) if atr > avg * self.params.vol_threshold => {}
                _ => return Signal::flat(bar, bar_index, "volatility filter"),
            }
        }

        if self.params.use_trend_filter {
            let aligned = match indicators.value(&self.trend_key, bar_index) {
                Some(trend) => match side {
                    PositionSide::Long => bar.close > trend,
                    PositionSide::Short => bar.close < trend,
                },
                None => false,
            };
            if !aligned {
                return Signal::flat(bar, bar_index, "trend filter");
            }
        }

        let risk_unit = atr * self.params.atr_multiplier;
        if risk_unit <= 0.0 {
            return Signal::flat(bar, bar_index, "zero volatility");
        }

        let reason = match side {
            PositionSide::Long => "donchian breakout",
            PositionSide::Short => "donchian breakdown",
        };
        Signal::entry(
            bar,
            bar_index,
            side,
            risk_unit,
            self.params.profit_multiplier,
            reason,
        )
        .with_metadata("channel", channel)
        .with_metadata("atr", atr)
    }
}

impl Strategy for TurtleBreakout {
    fn name(&self) -> &str {
        STRATEGY
    }

    fn warmup_bars(&self) -> usize {
        let p = &self.params;
        let mut warmup = p.entry_period.max(p.exit_period).max(p.atr_period);
        if p.use_vol_filter {
            warmup = warmup.max(p.atr_period + p.vol_lookback - 1);
        }
        if p.use_trend_filter {
            warmup = warmup.max(p.trend_period - 1);
        }
        warmup
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        let p = &self.params;
        let mut out: Vec<Box<dyn Indicator>> = vec![
            Box::new(Donchian::upper(p.entry_period)),
            Box::new(Donchian::lower(p.entry_period)),
            Box::new(Donchian::upper(p.exit_period)),
            Box::new(Donchian::lower(p.exit_period)),
            Box::new(Atr::new(p.atr_period)),
        ];
        if p.use_vol_filter {
            out.push(Box::new(AtrAverage::new(p.atr_period, p.vol_lookback)));
        }
        if p.use_trend_filter {
            out.push(Box::new(Sma::new(p.trend_period)));
        }
        out
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
        match position {
            Some(pos) => self.evaluate_exit(bar, bar_index, indicators, pos.side),
            None => self.evaluate_entry(bar, bar_index, indicators),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{precompute_indicators, SignalDirection};
    use crate::indicators::make_bars;

    fn run(strategy: &TurtleBreakout, bars: &[Bar]) -> Vec<Signal> {
        let iv = precompute_indicators(bars, &strategy.indicators());
        (0..bars.len())
            .map(|i| strategy.evaluate(bars, i, &iv, None))
            .collect()
    }

    fn rising(n: usize, step: f64) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + step * i as f64).collect();
        make_bars(&closes)
    }

    #[test]
    fn breakout_fires_at_first_bar_above_prior_channel() {
        // Each close clears the previous bar's high (close + 1) when step > 1.
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let signals = run(&strategy, &rising(25, 2.0));
        let first = signals.iter().position(|s| !s.is_flat()).unwrap();
        assert_eq!(first, 20);
        assert_eq!(signals[20].direction, SignalDirection::Long);
        assert!(signals[..20].iter().all(|s| s.reason == "warmup"));
    }

    #[test]
    fn slow_rise_never_clears_channel() {
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let signals = run(&strategy, &rising(25, 0.5));
        assert!(signals.iter().all(|s| s.is_flat()));
    }

    #[test]
    fn entry_levels_from_atr() {
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let bars = rising(25, 2.0);
        let iv = precompute_indicators(&bars, &strategy.indicators());
        let signal = strategy.evaluate(&bars, 20, &iv, None);
        let atr = iv.value("atr_14", 20).unwrap();
        let close = bars[20].close;
        assert_eq!(signal.risk_unit, Some(atr * 2.0));
        assert_eq!(signal.stop_loss, Some(close - atr * 2.0));
        assert_eq!(signal.take_profit, Some(close + atr * 4.0));
        assert_eq!(signal.metadata["atr"], atr);
    }

    #[test]
    fn breakdown_goes_short() {
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let closes: Vec<f64> = (0..25).map(|i| 200.0 - 2.0 * i as f64).collect();
        let signals = run(&strategy, &make_bars(&closes));
        assert_eq!(signals[20].direction, SignalDirection::Short);
        assert!(signals[20].stop_loss.unwrap() > closes[20]);
    }

    #[test]
    fn long_exits_below_exit_channel() {
        let params = TurtleParams {
            entry_period: 5,
            exit_period: 3,
            atr_period: 3,
            ..TurtleParams::default()
        };
        let strategy = TurtleBreakout::new(params);
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 + 2.0 * i as f64).collect();
        closes.push(90.0);
        let bars = make_bars(&closes);
        let iv = precompute_indicators(&bars, &strategy.indicators());
        let pos = PositionState {
            side: PositionSide::Long,
            entry_price: 110.0,
            entry_bar: 6,
        };
        assert_eq!(strategy.evaluate(&bars, 9, &iv, Some(&pos)).reason, "hold");
        let exit = strategy.evaluate(&bars, 10, &iv, Some(&pos));
        assert_eq!(exit.direction, SignalDirection::Exit);
    }

    #[test]
    fn holding_suppresses_new_entries() {
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let bars = rising(25, 2.0);
        let iv = precompute_indicators(&bars, &strategy.indicators());
        let pos = PositionState {
            side: PositionSide::Long,
            entry_price: 140.0,
            entry_bar: 21,
        };
        assert!(strategy.evaluate(&bars, 22, &iv, Some(&pos)).is_flat());
    }

    #[test]
    fn vol_filter_blocks_steady_trend() {
        // Constant true range: ATR never exceeds its own average times 1.2.
        let params = TurtleParams {
            use_vol_filter: true,
            vol_lookback: 5,
            ..TurtleParams::default()
        };
        let strategy = TurtleBreakout::new(params);
        let signals = run(&strategy, &rising(40, 2.0));
        assert!(signals.iter().all(|s| s.is_flat()));
        assert!(signals.iter().any(|s| s.reason == "volatility filter"));
    }

    #[test]
    fn trend_filter_blocks_counter_trend_short() {
        let params = TurtleParams {
            entry_period: 2,
            exit_period: 3,
            atr_period: 3,
            use_trend_filter: true,
            trend_period: 10,
            ..TurtleParams::default()
        };
        let strategy = TurtleBreakout::new(params);
        // Uptrend, then a drop below the 2-bar channel (159) that stays above SMA(10) (150.5).
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + 5.0 * i as f64).collect();
        closes.push(155.0);
        let bars = make_bars(&closes);
        let iv = precompute_indicators(&bars, &strategy.indicators());
        let signal = strategy.evaluate(&bars, 15, &iv, None);
        assert_eq!(signal.reason, "trend filter");
    }

    #[test]
    fn warmup_accounts_for_filters() {
        let plain = TurtleBreakout::new(TurtleParams::default());
        assert_eq!(plain.warmup_bars(), 20);
        assert_eq!(plain.indicators().len(), 5);
        let filtered = TurtleBreakout::new(TurtleParams {
            use_vol_filter: true,
            use_trend_filter: true,
            ..TurtleParams::default()
        });
        assert_eq!(filtered.warmup_bars(), 199);
        assert_eq!(filtered.indicators().len(), 7);
    }

    #[test]
    fn evaluation_ignores_future_bars() {
        let strategy = TurtleBreakout::new(TurtleParams::default());
        let bars = rising(30, 2.0);
        let full = precompute_indicators(&bars, &strategy.indicators());
        for i in 0..bars.len() {
            let truncated = &bars[..=i];
            let partial = precompute_indicators(truncated, &strategy.indicators());
            assert_eq!(
                strategy.evaluate(&bars, i, &full, None),
                strategy.evaluate(truncated, i, &partial, None)
            );
        }
    }

    #[test]
    fn out_of_domain_params_rejected() {
        let ps = ParameterSet::new().with("entry_period", 1usize);
        assert!(TurtleParams::from_parameter_set(&ps).is_err());
    }
}
