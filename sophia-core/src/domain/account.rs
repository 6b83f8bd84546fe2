//! AccountState: balance, open positions, and the loss-limit counters.

use super::position::Position;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    #[error("position size must be > 0, got {0}")]
    InvalidSize(f64),

    #[error("position already open for '{0}'")]
    AlreadyOpen(String),
}

/// Result of closing a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub exit_commission: f64,
    /// Gross P&L minus entry and exit commissions.
    pub net_pnl: f64,
}

/// Account ledger owned by one simulation run (or mirrored from the broker in live mode).
///
/// Accounting identity, checked after every bar:
/// `equity == balance + sum(unrealized P&L of open positions)`.
///
/// `daily_realized_loss` is never negative and resets on each trading-day boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub positions: BTreeMap<String, Position>,
    pub daily_realized_loss: f64,
    pub starting_daily_equity: f64,
    pub peak_equity: f64,
    pub trading_day: Option<NaiveDate>,
}

impl AccountState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            balance: initial_cash,
            positions: BTreeMap::new(),
            daily_realized_loss: 0.0,
            starting_daily_equity: initial_cash,
            peak_equity: initial_cash,
            trading_day: None,
        }
    }

    /// Sum of unrealized P&L across open positions at their last marks.
    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    /// Equity = balance + unrealized P&L.
    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized_pnl()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of open positions tagged with the given correlation group.
    pub fn correlated_count(&self, group: &str) -> usize {
        self.positions
            .values()
            .filter(|p| p.correlation_group.as_deref() == Some(group))
            .count()
    }

    /// Absolute decline of current equity from the historical peak (>= 0).
    pub fn drawdown(&self) -> f64 {
        (self.peak_equity - self.equity()).max(0.0)
    }

    /// Roll the daily loss counter if `day` starts a new trading day.
    ///
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, day: NaiveDate) -> bool {
        if self.trading_day == Some(day) {
            return false;
        }
        self.trading_day = Some(day);
        self.daily_realized_loss = 0.0;
        self.starting_daily_equity = self.equity();
        true
    }

    pub fn update_peak(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    /// Update the mark of an open position. No-op for flat symbols.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            pos.mark = price;
        }
    }

    /// Book a filled entry. The entry commission is charged to the balance immediately.
    pub fn open_position(&mut self, position: Position) -> Result<(), AccountError> {
        if position.size.is_nan() || position.size <= 0.0 {
            return Err(AccountError::InvalidSize(position.size));
        }
        if self.positions.contains_key(&position.symbol) {
            return Err(AccountError::AlreadyOpen(position.symbol.clone()));
        }
        self.balance -= position.entry_commission;
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Close the position in `symbol` at `exit_price`, realizing P&L into the balance.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: f64,
        exit_commission: f64,
    ) -> Option<ClosedPosition> {
        let position = self.positions.remove(symbol)?;
        let gross_pnl = position.pnl_at(exit_price);
        let net_pnl = gross_pnl - position.entry_commission - exit_commission;

        self.balance += gross_pnl - exit_commission;
        if net_pnl < 0.0 {
            self.daily_realized_loss += -net_pnl;
        }

        Some(ClosedPosition {
            position,
            exit_price,
            gross_pnl,
            exit_commission,
            net_pnl,
        })
    }
}
