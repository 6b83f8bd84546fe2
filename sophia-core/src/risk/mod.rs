//! Risk manager: sizes entries and gates them against account limits.
//!
//! `size_and_gate` is pure. It reads the account and never mutates it, so the
//! same signal and account snapshot always yield the same intent whether the
//! caller is the simulator or a live driver.

pub mod config;
pub mod guards;
pub mod intent;

pub use config::{RiskConfig, TradingHours};
pub use guards::RejectionReason;
pub use intent::OrderIntent;

use crate::components::{Signal, SignalDirection};
use crate::domain::{AccountState, PositionSide, SymbolSpec};

use guards::{check_capacity, check_correlation, check_loss_limits, check_session, Rejection};

/// Size `signal` and apply every risk rule in order. The first failing rule
/// produces a zero-size intent carrying its reason.
///
/// Order: symbol match, account validity, max positions, correlation group,
/// daily loss, total drawdown, session window, stop-loss presence, lot sizing.
pub fn size_and_gate(
    signal: &Signal,
    account: &AccountState,
    spec: &SymbolSpec,
    config: &RiskConfig,
) -> OrderIntent {
    match signal.direction {
        SignalDirection::Flat => OrderIntent::from_signal(signal, 0.0, signal.reason.clone()),
        SignalDirection::Exit => match account.position(&signal.symbol) {
            Some(pos) => OrderIntent::from_signal(signal, pos.size, signal.reason.clone()),
            None => OrderIntent::from_signal(signal, 0.0, "no open position"),
        },
        SignalDirection::Long | SignalDirection::Short => {
            match gate_entry(signal, account, spec, config) {
                Ok((size, rationale)) => OrderIntent::from_signal(signal, size, rationale),
                Err((reason, detail)) => {
                    tracing::debug!(
                        symbol = %signal.symbol,
                        bar = signal.bar_index,
                        reason = %reason,
                        detail = %detail,
                        "entry rejected"
                    );
                    OrderIntent::rejected(signal, reason, detail)
                }
            }
        }
    }
}

fn gate_entry(
    signal: &Signal,
    account: &AccountState,
    spec: &SymbolSpec,
    config: &RiskConfig,
) -> Result<(f64, String), Rejection> {
    if spec.symbol != signal.symbol {
        return Err((
            RejectionReason::SymbolMismatch,
            format!("signal for '{}' checked against '{}'", signal.symbol, spec.symbol),
        ));
    }
    let equity = account.equity();
    if !equity.is_finite() || equity <= 0.0 {
        return Err((RejectionReason::InvalidAccount, format!("equity {equity}")));
    }

    check_capacity(account, config)?;
    check_correlation(account, spec, config)?;
    check_loss_limits(account, config)?;
    check_session(signal.timestamp, &config.trading_hours)?;

    let stop_distance = protective_stop_distance(signal);
    let size = match stop_distance {
        Some(distance) => {
            let scale = drawdown_scale(account, config);
            spec.round_lots_down(risk_based_size(equity, distance, spec, config) * scale)
        }
        None if config.enforce_stop_loss => {
            return Err((
                RejectionReason::MissingStopLoss,
                "no stop on the protective side".into(),
            ));
        }
        None => spec.min_lot,
    };

    if size < spec.min_lot {
        return Err((
            RejectionReason::BelowMinLot,
            format!("size {size} below min lot {}", spec.min_lot),
        ));
    }

    let rationale = match stop_distance {
        Some(d) => format!("{}; {size} lots, stop distance {d}", signal.reason),
        None => format!("{}; {size} lots, no stop", signal.reason),
    };
    Ok((size, rationale))
}

/// Distance from the decision price to a stop that actually protects the position.
fn protective_stop_distance(signal: &Signal) -> Option<f64> {
    let side = signal.direction.entry_side()?;
    let stop = signal.stop_loss?;
    let distance = match side {
        PositionSide::Long => signal.price - stop,
        PositionSide::Short => stop - signal.price,
    };
    (distance.is_finite() && distance > 0.0).then_some(distance)
}

/// Lots that lose `risk_per_trade × equity` if the stop is hit.
pub fn risk_based_size(equity: f64, stop_distance: f64, spec: &SymbolSpec, config: &RiskConfig) -> f64 {
    config.risk_per_trade * equity / (stop_distance * spec.contract_size)
}

/// Linear size reduction as drawdown approaches the total-loss limit; 1.0 when disabled.
pub fn drawdown_scale(account: &AccountState, config: &RiskConfig) -> f64 {
    if !config.adaptive_position_sizing || account.peak_equity <= 0.0 {
        return 1.0;
    }
    let dd_fraction = account.drawdown() / account.peak_equity;
    (1.0 - dd_fraction / config.max_total_loss).max(0.0)
}
