//! End-to-end simulator behavior: determinism, multi-symbol limits, live parity.

use chrono::{Duration, NaiveDate};
use sophia_core::components::precompute_indicators;
use sophia_core::domain::{AccountState, Bar, ExitReason, SymbolSpec};
use sophia_core::engine::{
    decide, BarSource, HistoricalBars, LiveDriver, SimulationConfig, SimulationOutput, Simulator,
};
use sophia_core::risk::{OrderIntent, RejectionReason, RiskConfig};
use sophia_core::strategy::{Strategy, StrategyConfig, StrategyKind, TurtleParams};

fn trend_bars(symbol: &str, n: usize, phase: f64) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut prev = 100.0;
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x * 0.12 + phase).sin() * 15.0 + x * 0.05;
            let open = prev;
            prev = close;
            Bar {
                symbol: symbol.into(),
                timestamp: base + Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

fn spec(symbol: &str, group: Option<&str>) -> SymbolSpec {
    SymbolSpec {
        contract_size: 1.0,
        spread: 0.05,
        commission_per_lot: 0.1,
        correlation_group: group.map(String::from),
        ..SymbolSpec::new(symbol)
    }
}

fn fast_turtle() -> Box<dyn Strategy> {
    StrategyConfig::Turtle(TurtleParams {
        entry_period: 10,
        exit_period: 5,
        atr_period: 5,
        ..TurtleParams::default()
    })
    .build()
    .unwrap()
}

fn run(
    strategy: &dyn Strategy,
    config: SimulationConfig,
    data: Vec<(&str, Vec<Bar>)>,
) -> SimulationOutput {
    let sources: Vec<Box<dyn BarSource>> = data
        .into_iter()
        .map(|(s, bars)| Box::new(HistoricalBars::new(s, bars)) as Box<dyn BarSource>)
        .collect();
    Simulator::new(config, strategy).run(sources).unwrap()
}

#[test]
fn identical_inputs_give_identical_output() {
    let strategy = fast_turtle();
    let config = SimulationConfig::new(10_000.0, vec![spec("AAA", None)]);
    let a = run(strategy.as_ref(), config.clone(), vec![("AAA", trend_bars("AAA", 300, 0.0))]);
    let b = run(strategy.as_ref(), config, vec![("AAA", trend_bars("AAA", 300, 0.0))]);
    assert!(!a.trades.is_empty());
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn every_trade_closes_and_last_bar_flattens() {
    let strategy = fast_turtle();
    let config = SimulationConfig::new(10_000.0, vec![spec("AAA", None)]);
    let out = run(strategy.as_ref(), config, vec![("AAA", trend_bars("AAA", 300, 0.0))]);
    for t in &out.trades {
        assert!(t.exit_bar >= t.entry_bar);
        assert!(t.size > 0.0);
        assert!(t.commission > 0.0);
    }
    let last = out.equity_curve.last().unwrap();
    assert_eq!(last.equity, out.final_balance);
    // Entries can only fill after warm-up plus one bar.
    assert!(out.trades.iter().all(|t| t.entry_bar > 10));
    let eod = out
        .trades
        .iter()
        .filter(|t| t.exit_reason == ExitReason::EndOfData)
        .count();
    assert!(eod <= 1);
}

#[test]
fn correlation_group_caps_concurrent_positions() {
    let strategy = fast_turtle();
    let symbols = ["AAA", "BBB", "CCC"];
    let mut config = SimulationConfig::new(
        100_000.0,
        symbols.iter().map(|s| spec(s, Some("fx"))).collect(),
    );
    config.risk = RiskConfig {
        max_correlated: 1,
        ..RiskConfig::default()
    };
    // Identical price paths: every symbol breaks out on the same bar.
    let data = symbols
        .iter()
        .map(|s| (*s, trend_bars(s, 200, 0.0)))
        .collect();
    let out = run(strategy.as_ref(), config, data);
    assert!(out.rejections.get(&RejectionReason::CorrelationLimit).copied().unwrap_or(0) > 0);

    // Never more than one trade open at a time.
    for a in &out.trades {
        let overlapping = out
            .trades
            .iter()
            .filter(|b| b.entry_time < a.exit_time && a.entry_time < b.exit_time)
            .count();
        assert!(overlapping <= 1, "{} overlaps", a.symbol);
    }
}

#[test]
fn multi_symbol_timeline_merges_unequal_histories() {
    let strategy = fast_turtle();
    let config = SimulationConfig::new(
        10_000.0,
        vec![spec("AAA", None), spec("BBB", None)],
    );
    let short = trend_bars("BBB", 120, 1.0);
    let out = run(
        strategy.as_ref(),
        config,
        vec![("AAA", trend_bars("AAA", 200, 0.0)), ("BBB", short)],
    );
    assert_eq!(out.bar_count, 200);
    assert_eq!(out.equity_curve.len(), 200);
    assert!(out
        .equity_curve
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn live_driver_matches_precomputed_decisions() {
    let strategy = StrategyKind::EmaCrossover.default_config().build().unwrap();
    let bars = trend_bars("AAA", 160, 0.3);
    let account = AccountState::new(10_000.0);
    let risk = RiskConfig::default();
    let symbol = spec("AAA", None);

    let full = precompute_indicators(&bars, &strategy.indicators());
    let expected: Vec<_> = (0..bars.len())
        .map(|i| decide(strategy.as_ref(), &bars, i, &full, &account, &symbol, &risk))
        .collect();

    let mut driver = LiveDriver::new(
        strategy.as_ref(),
        symbol.clone(),
        risk.clone(),
        HistoricalBars::new("AAA", bars.clone()),
        Vec::<OrderIntent>::new(),
    )
    .unwrap();
    let mut live = Vec::new();
    while let Some(d) = driver.step(&account).unwrap() {
        live.push((d.signal, d.intent));
    }
    assert_eq!(live, expected);

    let submitted = driver.into_sink();
    let expected_submitted: Vec<OrderIntent> = expected
        .into_iter()
        .map(|(_, i)| i)
        .filter(|i| i.is_actionable())
        .collect();
    assert_eq!(submitted, expected_submitted);
}
