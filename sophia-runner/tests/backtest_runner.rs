//! End-to-end: CSV files on disk → loaded data → backtest → artifacts.

use std::io::Write;
use std::path::PathBuf;

use proptest::prelude::*;
use sophia_core::strategy::StrategyConfig;
use sophia_runner::export::{export_json, save_artifacts};
use sophia_runner::{
    load_symbols, run_backtest, BacktestContext, LoadError, SophiaConfig,
};

const CONFIG: &str = r#"
    initial_cash = 10000.0

    [[symbols]]
    symbol = "AAA"
    contract_size = 1.0
    spread = 0.02
    commission_per_lot = 0.5

    [[symbols]]
    symbol = "BBB"
    contract_size = 1.0

    [strategy]
    type = "turtle"
    entry_period = 15
    exit_period = 7
"#;

fn csv_body(n: usize, phase: f64) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut prev = 50.0;
    for i in 0..n {
        let day = start + chrono::Duration::days(i as i64);
        let close = 50.0 + ((i as f64 + phase) * 0.09).sin() * 8.0 + i as f64 * 0.03;
        let open = prev;
        prev = close;
        out.push_str(&format!(
            "{},{:.4},{:.4},{:.4},{:.4},{}\n",
            day.format("%Y-%m-%d"),
            open,
            open.max(close) + 0.5,
            open.min(close) - 0.5,
            close,
            1000 + i
        ));
    }
    out
}

fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

fn context(dir: &tempfile::TempDir) -> (SophiaConfig, BacktestContext) {
    let cfg = SophiaConfig::from_toml_str(CONFIG).unwrap();
    let inputs = vec![
        ("AAA".to_string(), write_csv(dir, "aaa.csv", &csv_body(300, 0.0))),
        ("BBB".to_string(), write_csv(dir, "bbb.csv", &csv_body(260, 11.0))),
    ];
    let data = load_symbols(&inputs).unwrap();
    let ctx = BacktestContext::new(&cfg, data).unwrap();
    (cfg, ctx)
}

#[test]
fn csv_to_result_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, ctx) = context(&dir);

    let first = run_backtest(&ctx, &cfg.strategy).unwrap();
    let second = run_backtest(&ctx, &cfg.strategy).unwrap();
    assert_eq!(export_json(&first).unwrap(), export_json(&second).unwrap());

    assert_eq!(first.symbols, vec!["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(first.bar_count, 300 + 260);
    assert!(first.trades.iter().all(|t| t.exit_bar >= t.entry_bar));
    assert_eq!(first.metrics.trade_count, first.trades.len());
}

#[test]
fn reloaded_parameters_reproduce_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, ctx) = context(&dir);
    let first_run = run_backtest(&ctx, &cfg.strategy).unwrap();

    let json = serde_json::to_string(&first_run.parameters).unwrap();
    let params = serde_json::from_str(&json).unwrap();
    let rebuilt = StrategyConfig::from_parameter_set(cfg.strategy.kind(), &params).unwrap();
    assert_eq!(rebuilt, cfg.strategy);

    let replay = run_backtest(&ctx, &rebuilt).unwrap();
    assert_eq!(replay, first_run);
    assert_eq!(export_json(&replay).unwrap(), export_json(&first_run).unwrap());
}

#[test]
fn artifacts_land_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, ctx) = context(&dir);
    let result = run_backtest(&ctx, &cfg.strategy).unwrap();
    let out = save_artifacts(&result, &dir.path().join("out")).unwrap();
    let trades = std::fs::read_to_string(out.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), result.trades.len() + 1);
}

#[test]
fn out_of_order_rows_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let body = "timestamp,open,high,low,close\n\
                2024-01-02,1,2,0.5,1.5\n\
                2024-01-01,1,2,0.5,1.5\n";
    let path = write_csv(&dir, "bad.csv", body);
    let err = load_symbols(&[("AAA".to_string(), path)]).unwrap_err();
    assert!(matches!(err, LoadError::Data(_)));
}

#[test]
fn missing_file_is_io_error() {
    let err = load_symbols(&[("AAA".to_string(), PathBuf::from("/nonexistent/aaa.csv"))])
        .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_history_completes_with_finite_balance(n in 30usize..200, phase in 0.0f64..50.0) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SophiaConfig::from_toml_str(CONFIG).unwrap();
        let path = write_csv(&dir, "aaa.csv", &csv_body(n, phase));
        let data = load_symbols(&[("AAA".to_string(), path)]).unwrap();
        let ctx = BacktestContext::new(&cfg, data).unwrap();
        let result = run_backtest(&ctx, &cfg.strategy).unwrap();

        prop_assert!(result.final_balance.is_finite());
        prop_assert_eq!(result.equity_curve.len(), n);
        let net: f64 = result.trades.iter().map(|t| t.net_pnl).sum();
        prop_assert!((result.initial_cash + net - result.final_balance).abs() < 1e-6);
    }
}
