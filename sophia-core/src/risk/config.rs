//! Risk limits and the trading-session window.

use serde::{Deserialize, Serialize};

use crate::params::ConfigError;

/// Account-level risk limits. Fractions are of equity (0.01 = 1%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    /// Equity fraction risked between entry and stop on each trade.
    pub risk_per_trade: f64,
    /// Realized loss per trading day, as a fraction of the day's starting equity.
    pub max_daily_loss: f64,
    /// Decline from peak equity that halts new entries.
    pub max_total_loss: f64,
    pub max_positions: usize,
    /// Open positions allowed per correlation group.
    pub max_correlated: usize,
    pub enforce_stop_loss: bool,
    /// Shrink position size linearly as drawdown approaches `max_total_loss`.
    pub adaptive_position_sizing: bool,
    pub trading_hours: TradingHours,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            max_daily_loss: 0.05,
            max_total_loss: 0.10,
            max_positions: 5,
            max_correlated: 2,
            enforce_stop_loss: true,
            adaptive_position_sizing: true,
            trading_hours: TradingHours::default(),
        }
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRisk {
            field,
            reason: format!("must be in (0, 1], got {value}"),
        })
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        fraction("risk_per_trade", self.risk_per_trade)?;
        fraction("max_daily_loss", self.max_daily_loss)?;
        fraction("max_total_loss", self.max_total_loss)?;
        if self.max_positions == 0 {
            return Err(ConfigError::InvalidRisk {
                field: "max_positions",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_correlated == 0 {
            return Err(ConfigError::InvalidRisk {
                field: "max_correlated",
                reason: "must be at least 1".into(),
            });
        }
        self.trading_hours.validate()
    }
}

/// Session window in the bar timestamps' own clock (UTC for the CSV loader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TradingHours {
    pub use_time_filter: bool,
    /// First hour (inclusive) new entries are allowed.
    pub start_hour: u32,
    /// Hour (exclusive) after which new entries are refused.
    pub end_hour: u32,
    pub weekend_trading: bool,
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            use_time_filter: false,
            start_hour: 8,
            end_hour: 20,
            weekend_trading: false,
        }
    }
}

impl TradingHours {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_hour >= 24 || self.end_hour > 24 || self.start_hour >= self.end_hour {
            return Err(ConfigError::InvalidRisk {
                field: "trading_hours",
                reason: format!(
                    "need 0 <= start_hour < end_hour <= 24, got {}..{}",
                    self.start_hour, self.end_hour
                ),
            });
        }
        Ok(())
    }
}
