//! Property tests for core invariants.
//!
//! 1. Indicator output length equals input length; warm-up entries are NaN, never zero
//! 2. The risk manager never sizes an entry once max_positions are open
//! 3. Ledger identity: final equity = initial cash + realized net P&L
//! 4. Daily realized loss is never negative

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use sophia_core::components::{Indicator, Signal};
use sophia_core::domain::{AccountState, Bar, Position, PositionSide, SymbolSpec};
use sophia_core::engine::{HistoricalBars, SimulationConfig, Simulator};
use sophia_core::indicators::{Atr, Donchian, Ema, Macd, Rsi, Sma};
use sophia_core::risk::{size_and_gate, RejectionReason, RiskConfig};
use sophia_core::strategy::{StrategyConfig, TurtleParams};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn walk_bars(symbol: &str, steps: &[f64]) -> Vec<Bar> {
    let mut close = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let open = close;
            close = (close + step).max(1.0);
            Bar {
                symbol: symbol.to_string(),
                timestamp: t0() + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: (open.min(close) - 0.5).max(0.01),
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

fn arb_steps(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0..3.0_f64, len)
}

fn all_indicators() -> Vec<Box<dyn Indicator>> {
    vec![
        Box::new(Sma::new(5)),
        Box::new(Ema::new(7)),
        Box::new(Atr::new(4)),
        Box::new(Donchian::upper(6)),
        Box::new(Donchian::lower(6)),
        Box::new(Macd::line(3, 8, 4)),
        Box::new(Macd::histogram(3, 8, 4)),
        Box::new(Rsi::new(5)),
    ]
}

fn open_position(account: &mut AccountState, symbol: &str) {
    account
        .open_position(Position {
            symbol: symbol.into(),
            side: PositionSide::Long,
            size: 1.0,
            entry_price: 100.0,
            stop_loss: Some(90.0),
            take_profit: None,
            opened_at: t0(),
            entry_bar: 0,
            contract_size: 1.0,
            correlation_group: None,
            entry_commission: 0.0,
            mark: 100.0,
        })
        .unwrap();
}

proptest! {
    #[test]
    fn indicator_shape_and_warmup(steps in arb_steps(1..60)) {
        let bars = walk_bars("P", &steps);
        for ind in all_indicators() {
            let out = ind.compute(&bars);
            prop_assert_eq!(out.len(), bars.len());
            let warm = ind.lookback().min(bars.len());
            prop_assert!(out[..warm].iter().all(|v| v.is_nan()), "{}", ind.name());
            prop_assert!(out[warm..].iter().all(|v| !v.is_nan()), "{}", ind.name());
        }
    }

    #[test]
    fn no_entry_size_at_max_positions(
        open in 0usize..8,
        max_positions in 1usize..6,
        stop_gap in 0.5..20.0_f64,
    ) {
        let config = RiskConfig { max_positions, ..RiskConfig::default() };
        let mut account = AccountState::new(50_000.0);
        for k in 0..open {
            open_position(&mut account, &format!("S{k}"));
        }
        let bar = walk_bars("NEW", &[0.0]).remove(0);
        let signal = Signal::entry(&bar, 0, PositionSide::Long, stop_gap, 2.0, "prop");
        let spec = SymbolSpec { contract_size: 1.0, ..SymbolSpec::new("NEW") };
        let intent = size_and_gate(&signal, &account, &spec, &config);
        if open >= max_positions {
            prop_assert_eq!(intent.size, 0.0);
            prop_assert_eq!(intent.rejection, Some(RejectionReason::MaxPositions));
        }
        prop_assert!(intent.size >= 0.0);
        prop_assert!(intent.size <= spec.max_lot);
    }

    #[test]
    fn final_equity_matches_realized_pnl(steps in arb_steps(30..150)) {
        let strategy = StrategyConfig::Turtle(TurtleParams {
            entry_period: 5,
            exit_period: 3,
            atr_period: 3,
            ..TurtleParams::default()
        })
        .build()
        .unwrap();
        let spec = SymbolSpec {
            contract_size: 1.0,
            spread: 0.1,
            commission_per_lot: 0.5,
            ..SymbolSpec::new("P")
        };
        let config = SimulationConfig::new(10_000.0, vec![spec]);
        let mut sim = Simulator::new(config, strategy.as_ref());
        let out = sim
            .run(vec![Box::new(HistoricalBars::new("P", walk_bars("P", &steps)))])
            .unwrap();
        let realized: f64 = out.trades.iter().map(|t| t.net_pnl).sum();
        let last = out.equity_curve.last().unwrap().equity;
        prop_assert!((last - (10_000.0 + realized)).abs() < 1e-6);
        prop_assert!((out.final_balance - last).abs() < 1e-9);
        prop_assert_eq!(out.equity_curve.len(), steps.len());
    }

    #[test]
    fn daily_loss_never_negative(exits in prop::collection::vec(50.0..150.0_f64, 1..20)) {
        let mut account = AccountState::new(10_000.0);
        for (k, exit) in exits.iter().enumerate() {
            let symbol = format!("S{k}");
            open_position(&mut account, &symbol);
            account.close_position(&symbol, *exit, 0.0);
            prop_assert!(account.daily_realized_loss >= 0.0);
        }
    }
}
