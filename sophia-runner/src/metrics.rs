//! Performance metrics: pure functions over an equity curve and a trade list.
//!
//! Curves are sampled once per bar, so annualization takes the number of bars
//! per year instead of assuming daily data.

use serde::{Deserialize, Serialize};
use sophia_core::domain::TradeRecord;

/// Cap for profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Summary statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Negative fraction, 0.0 when equity never fell below its peak.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    /// Mean net P&L per trade in account currency.
    pub avg_trade: f64,
    pub avg_bars_held: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord], periods_per_year: f64) -> Self {
        Self {
            total_return: total_return(equity_curve),
            cagr: cagr(equity_curve, periods_per_year),
            sharpe: sharpe_ratio(equity_curve, periods_per_year),
            sortino: sortino_ratio(equity_curve, periods_per_year),
            calmar: calmar_ratio(equity_curve, periods_per_year),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            avg_trade: avg_trade(trades),
            avg_bars_held: avg_bars_held(trades),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
        }
    }
}

// ─── Curve metrics ──────────────────────────────────────────────────

/// (final - initial) / initial. Zero for fewer than two points.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if equity_curve.len() >= 2 && first > 0.0 => {
            (last - first) / first
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate over `len - 1` periods.
pub fn cagr(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let (Some(&first), Some(&last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || first <= 0.0 || last <= 0.0 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let years = (equity_curve.len() - 1) as f64 / periods_per_year;
    (last / first).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio of per-bar returns, zero risk-free rate.
///
/// Zero when there are fewer than two returns or no variance.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&returns) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio: mean return over downside deviation.
pub fn sortino_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: f64 = returns
        .iter()
        .filter(|r| **r < 0.0)
        .map(|r| r * r)
        .sum();
    if downside == 0.0 {
        return 0.0;
    }
    let downside_std = (downside / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(&returns) / downside_std * periods_per_year.sqrt()
}

/// CAGR / |max drawdown|. Zero without a drawdown or without growth.
pub fn calmar_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let growth = cagr(equity_curve, periods_per_year);
    let dd = max_drawdown(equity_curve);
    if dd >= 0.0 || growth <= 0.0 {
        return 0.0;
    }
    growth / dd.abs()
}

/// Deepest peak-to-trough decline as a negative fraction (-0.15 = 15%).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.min((eq - peak) / peak);
        }
    }
    worst
}

// ─── Trade metrics ──────────────────────────────────────────────────

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profit over gross loss, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let profit: f64 = trades.iter().map(|t| t.net_pnl.max(0.0)).sum();
    let loss: f64 = trades.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
    if loss < 1e-10 {
        return if profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (profit / loss).min(PROFIT_FACTOR_CAP)
}

pub fn avg_trade(trades: &[TradeRecord]) -> f64 {
    mean(&trades.iter().map(|t| t.net_pnl).collect::<Vec<_>>())
}

pub fn avg_bars_held(trades: &[TradeRecord]) -> f64 {
    mean(&trades.iter().map(|t| t.bars_held as f64).collect::<Vec<_>>())
}

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut best = 0;
    let mut run = 0;
    for t in trades {
        if t.is_winner() == winners {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity points.
pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
