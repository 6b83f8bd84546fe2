//! Rejection guards: each checks one limit and names the reason it fails.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{AccountState, SymbolSpec};

use super::config::{RiskConfig, TradingHours};

/// Why an entry was refused. Not an error: the intent is returned with size 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MaxPositions,
    CorrelationLimit,
    DailyLossLimit,
    TotalDrawdownLimit,
    OutsideTradingHours,
    WeekendSession,
    BelowMinLot,
    MissingStopLoss,
    SymbolMismatch,
    InvalidAccount,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MaxPositions => "max_positions",
            RejectionReason::CorrelationLimit => "correlation_limit",
            RejectionReason::DailyLossLimit => "daily_loss_limit",
            RejectionReason::TotalDrawdownLimit => "total_drawdown_limit",
            RejectionReason::OutsideTradingHours => "outside_trading_hours",
            RejectionReason::WeekendSession => "weekend_session",
            RejectionReason::BelowMinLot => "below_min_lot",
            RejectionReason::MissingStopLoss => "missing_stop_loss",
            RejectionReason::SymbolMismatch => "symbol_mismatch",
            RejectionReason::InvalidAccount => "invalid_account",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed check: reason plus human-readable context.
pub type Rejection = (RejectionReason, String);

pub fn check_capacity(account: &AccountState, config: &RiskConfig) -> Result<(), Rejection> {
    let open = account.open_position_count();
    if open >= config.max_positions {
        return Err((
            RejectionReason::MaxPositions,
            format!("{open} open, limit {}", config.max_positions),
        ));
    }
    Ok(())
}

pub fn check_correlation(
    account: &AccountState,
    spec: &SymbolSpec,
    config: &RiskConfig,
) -> Result<(), Rejection> {
    let Some(group) = spec.correlation_group.as_deref() else {
        return Ok(());
    };
    let open = account.correlated_count(group);
    if open >= config.max_correlated {
        return Err((
            RejectionReason::CorrelationLimit,
            format!("{open} open in group '{group}', limit {}", config.max_correlated),
        ));
    }
    Ok(())
}

pub fn check_loss_limits(account: &AccountState, config: &RiskConfig) -> Result<(), Rejection> {
    let daily_limit = config.max_daily_loss * account.starting_daily_equity;
    if account.daily_realized_loss >= daily_limit {
        return Err((
            RejectionReason::DailyLossLimit,
            format!(
                "daily loss {:.2} >= limit {:.2}",
                account.daily_realized_loss, daily_limit
            ),
        ));
    }
    let drawdown = account.drawdown();
    let total_limit = config.max_total_loss * account.peak_equity;
    if drawdown >= total_limit {
        return Err((
            RejectionReason::TotalDrawdownLimit,
            format!("drawdown {drawdown:.2} >= limit {total_limit:.2}"),
        ));
    }
    Ok(())
}

pub fn check_session(timestamp: NaiveDateTime, hours: &TradingHours) -> Result<(), Rejection> {
    if !hours.use_time_filter {
        return Ok(());
    }
    let weekday = timestamp.weekday();
    if !hours.weekend_trading && matches!(weekday, Weekday::Sat | Weekday::Sun) {
        return Err((RejectionReason::WeekendSession, format!("{weekday}")));
    }
    let hour = timestamp.hour();
    if hour < hours.start_hour || hour >= hours.end_hour {
        return Err((
            RejectionReason::OutsideTradingHours,
            format!(
                "hour {hour} outside {}..{}",
                hours.start_hour, hours.end_hour
            ),
        ));
    }
    Ok(())
}
