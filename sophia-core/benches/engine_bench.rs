//! Criterion benchmarks for Sophia hot paths.
//!
//! 1. Indicator precompute (single indicator and a full strategy stack)
//! 2. Per-bar decision (strategy evaluate + risk gate)
//! 3. Full simulation, one and several symbols

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sophia_core::components::{precompute_indicators, Indicator};
use sophia_core::domain::{AccountState, Bar, SymbolSpec};
use sophia_core::engine::{decide, BarSource, HistoricalBars, SimulationConfig, Simulator};
use sophia_core::indicators::{Atr, Donchian, Ema, Macd, Rsi, Sma};
use sophia_core::risk::RiskConfig;
use sophia_core::strategy::StrategyKind;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(symbol: &str, n: usize, offset: f64) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + offset + (i as f64 * 0.1).sin() * 10.0;
            Bar {
                symbol: symbol.to_string(),
                timestamp: base + chrono::Duration::hours(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

fn spec(symbol: &str) -> SymbolSpec {
    SymbolSpec {
        contract_size: 1.0,
        spread: 0.02,
        commission_per_lot: 0.5,
        ..SymbolSpec::new(symbol)
    }
}

// ── Indicators ───────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_precompute");

    for &bar_count in &[1_000, 10_000] {
        let bars = make_bars("BENCH", bar_count, 0.0);

        let single: Vec<Box<dyn Indicator>> = vec![Box::new(Sma::new(20))];
        group.bench_with_input(BenchmarkId::new("sma_20", bar_count), &bar_count, |b, _| {
            b.iter(|| precompute_indicators(black_box(&bars), black_box(&single)));
        });

        let full_stack: Vec<Box<dyn Indicator>> = vec![
            Box::new(Ema::new(9)),
            Box::new(Ema::new(21)),
            Box::new(Macd::histogram(9, 21, 5)),
            Box::new(Rsi::new(14)),
            Box::new(Atr::new(14)),
            Box::new(Donchian::upper(20)),
            Box::new(Donchian::lower(10)),
        ];
        group.bench_with_input(
            BenchmarkId::new("full_stack_7", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| precompute_indicators(black_box(&bars), black_box(&full_stack)));
            },
        );
    }

    group.finish();
}

// ── Decision ─────────────────────────────────────────────────────────

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");
    let bars = make_bars("BENCH", 2_000, 0.0);
    let account = AccountState::new(10_000.0);
    let risk = RiskConfig::default();
    let symbol = spec("BENCH");

    for kind in [StrategyKind::Turtle, StrategyKind::EmaCrossover] {
        let Ok(strategy) = kind.default_config().build() else {
            continue;
        };
        let values = precompute_indicators(&bars, &strategy.indicators());
        group.bench_function(kind.as_str(), |b| {
            b.iter(|| {
                for i in 0..bars.len() {
                    black_box(decide(
                        strategy.as_ref(),
                        &bars,
                        i,
                        &values,
                        &account,
                        &symbol,
                        &risk,
                    ));
                }
            });
        });
    }

    group.finish();
}

// ── Simulation ───────────────────────────────────────────────────────

fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");
    group.sample_size(20);

    let Ok(strategy) = StrategyKind::Turtle.default_config().build() else {
        return;
    };

    for &symbols in &[1usize, 5] {
        let names: Vec<String> = (0..symbols).map(|i| format!("SYM{i}")).collect();
        let data: Vec<Vec<Bar>> = names
            .iter()
            .enumerate()
            .map(|(i, s)| make_bars(s, 5_000, i as f64 * 5.0))
            .collect();
        let config = SimulationConfig::new(100_000.0, names.iter().map(|s| spec(s)).collect());

        group.bench_with_input(
            BenchmarkId::new("turtle_5000_bars", symbols),
            &symbols,
            |b, _| {
                b.iter(|| {
                    let sources: Vec<Box<dyn BarSource>> = names
                        .iter()
                        .zip(&data)
                        .map(|(s, bars)| {
                            Box::new(HistoricalBars::new(s.as_str(), bars.clone()))
                                as Box<dyn BarSource>
                        })
                        .collect();
                    Simulator::new(config.clone(), strategy.as_ref()).run(black_box(sources))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_indicators, bench_decide, bench_simulation);
criterion_main!(benches);
