//! Strategy engine: turns bars plus precomputed indicators into one signal per bar.
//!
//! A strategy sees `bars[..=bar_index]`, the indicator container and the side
//! of any open position for its symbol. It never sees the account, so sizing
//! and risk gating stay in the risk manager, and the same call sequence
//! produces the same signals live and in simulation.

mod ema_crossover;
mod turtle;

pub use ema_crossover::{EmaCrossover, EmaCrossoverParams};
pub use turtle::{TurtleBreakout, TurtleParams};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::components::{Indicator, IndicatorValues, Signal};
use crate::domain::{Bar, Position, PositionSide};
use crate::params::{ConfigError, ParameterDomain, ParameterSet};

/// What a strategy needs to know about the open position in its symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionState {
    pub side: PositionSide,
    pub entry_price: f64,
    pub entry_bar: usize,
}

impl From<&Position> for PositionState {
    fn from(p: &Position) -> Self {
        Self {
            side: p.side,
            entry_price: p.entry_price,
            entry_bar: p.entry_bar,
        }
    }
}

/// A parameterized trading strategy.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Bars that must precede the first bar that can produce a non-warm-up signal.
    fn warmup_bars(&self) -> usize;

    /// Indicators this strategy reads, precomputed once per run.
    fn indicators(&self) -> Vec<Box<dyn Indicator>>;

    /// Decide for `bars[bar_index]`. Always returns a signal; Flat when nothing happens.
    fn evaluate(
        &self,
        bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
        position: Option<&PositionState>,
    ) -> Signal;
}

/// Strategy family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Turtle,
    EmaCrossover,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Turtle => "turtle",
            StrategyKind::EmaCrossover => "ema_crossover",
        }
    }

    /// Declared parameter domains for this family.
    pub fn domains(&self) -> Vec<ParameterDomain> {
        match self {
            StrategyKind::Turtle => TurtleParams::domains(),
            StrategyKind::EmaCrossover => EmaCrossoverParams::domains(),
        }
    }

    pub fn default_config(&self) -> StrategyConfig {
        match self {
            StrategyKind::Turtle => StrategyConfig::Turtle(TurtleParams::default()),
            StrategyKind::EmaCrossover => StrategyConfig::EmaCrossover(EmaCrossoverParams::default()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turtle" => Ok(StrategyKind::Turtle),
            "ema_crossover" => Ok(StrategyKind::EmaCrossover),
            other => Err(format!(
                "unknown strategy '{other}' (expected turtle or ema_crossover)"
            )),
        }
    }
}

/// Serializable strategy configuration.
///
/// ```toml
/// [strategy]
/// type = "turtle"
/// entry_period = 20
/// exit_period = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Turtle(TurtleParams),
    EmaCrossover(EmaCrossoverParams),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Turtle(TurtleParams::default())
    }
}

impl StrategyConfig {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Turtle(_) => StrategyKind::Turtle,
            StrategyConfig::EmaCrossover(_) => StrategyKind::EmaCrossover,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::Turtle(p) => p.validate(),
            StrategyConfig::EmaCrossover(p) => p.validate(),
        }
    }

    /// Validate and construct the runtime strategy.
    pub fn build(&self) -> Result<Box<dyn Strategy>, ConfigError> {
        self.validate()?;
        Ok(match self {
            StrategyConfig::Turtle(p) => Box::new(TurtleBreakout::new(p.clone())),
            StrategyConfig::EmaCrossover(p) => Box::new(EmaCrossover::new(p.clone())),
        })
    }

    pub fn to_parameter_set(&self) -> ParameterSet {
        match self {
            StrategyConfig::Turtle(p) => p.to_parameter_set(),
            StrategyConfig::EmaCrossover(p) => p.to_parameter_set(),
        }
    }

    /// Build a config of `kind` from a parameter set; absent names take defaults.
    pub fn from_parameter_set(kind: StrategyKind, ps: &ParameterSet) -> Result<Self, ConfigError> {
        Ok(match kind {
            StrategyKind::Turtle => StrategyConfig::Turtle(TurtleParams::from_parameter_set(ps)?),
            StrategyKind::EmaCrossover => {
                StrategyConfig::EmaCrossover(EmaCrossoverParams::from_parameter_set(ps)?)
            }
        })
    }

    /// This config with `overrides` applied on top of its current values.
    pub fn with_overrides(&self, overrides: &ParameterSet) -> Result<Self, ConfigError> {
        let merged = self.to_parameter_set().merged(overrides);
        Self::from_parameter_set(self.kind(), &merged)
    }
}

/// Prior and current value of two series, for crossover detection.
pub(crate) fn crossed_above(a_prev: f64, b_prev: f64, a: f64, b: f64) -> bool {
    a_prev <= b_prev && a > b
}

pub(crate) fn crossed_below(a_prev: f64, b_prev: f64, a: f64, b: f64) -> bool {
    a_prev >= b_prev && a < b
}
