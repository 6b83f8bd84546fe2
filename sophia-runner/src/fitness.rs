//! Fitness function: configurable metric selector for candidate ranking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::metrics::PerformanceMetrics;

/// Which metric to optimize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    Sharpe,
    Return,
    Drawdown,
    ProfitFactor,
    Sortino,
    WinRate,
}

impl FitnessMetric {
    pub const ALL: [FitnessMetric; 6] = [
        Self::Sharpe,
        Self::Return,
        Self::Drawdown,
        Self::ProfitFactor,
        Self::Sortino,
        Self::WinRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sharpe => "sharpe",
            Self::Return => "return",
            Self::Drawdown => "drawdown",
            Self::ProfitFactor => "profit_factor",
            Self::Sortino => "sortino",
            Self::WinRate => "win_rate",
        }
    }

    /// Extract the metric from a run's summary.
    ///
    /// Drawdown is stored negative, so "less negative" already sorts higher.
    pub fn extract(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::Sharpe => metrics.sharpe,
            Self::Return => metrics.total_return,
            Self::Drawdown => metrics.max_drawdown,
            Self::ProfitFactor => metrics.profit_factor,
            Self::Sortino => metrics.sortino,
            Self::WinRate => metrics.win_rate,
        }
    }

    /// Score used for ranking. Missing or non-finite values disqualify.
    pub fn score(&self, metrics: Option<&PerformanceMetrics>) -> f64 {
        match metrics.map(|m| self.extract(m)) {
            Some(v) if v.is_finite() => v,
            _ => f64::NEG_INFINITY,
        }
    }

    /// Returns true if `a` is better than `b`. Higher always wins.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

impl fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitnessMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown metric '{s}' (expected one of {})", names.join(", "))
            })
    }
}
