//! Single-run orchestration: strategy config + loaded bars → `BacktestResult`.
//!
//! `run_backtest` does no I/O. The optimizer calls it once per candidate, each
//! call building its own simulator and account.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use sophia_core::domain::{Bar, TradeRecord};
use sophia_core::engine::{
    BarSource, EngineError, EquityPoint, HistoricalBars, SimulationConfig, Simulator,
    SimulatorState,
};
use sophia_core::params::{ConfigError, ParameterSet};
use sophia_core::risk::RejectionReason;
use sophia_core::strategy::StrategyConfig;

use crate::config::{ConfigFileError, SophiaConfig};
use crate::data_loader::{LoadError, LoadedData};
use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("config file: {0}")]
    ConfigFile(#[from] ConfigFileError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("data error: {0}")]
    Load(#[from] LoadError),

    #[error("no bars loaded")]
    NoData,

    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Current schema version for persisted results.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything a run needs besides the strategy. Shared read-only across workers.
#[derive(Debug, Clone)]
pub struct BacktestContext {
    pub simulation: SimulationConfig,
    pub periods_per_year: f64,
    pub bars: BTreeMap<String, Vec<Bar>>,
    pub dataset_hash: String,
}

impl BacktestContext {
    /// Pair a validated config with loaded data. Every loaded symbol needs a spec.
    pub fn new(config: &SophiaConfig, data: LoadedData) -> Result<Self, RunError> {
        config.validate()?;
        if data.bars.is_empty() {
            return Err(RunError::NoData);
        }
        let simulation = config.simulation();
        if let Some(missing) = data.symbols().find(|s| simulation.spec(s).is_none()) {
            return Err(ConfigError::UnknownSymbol(missing.to_string()).into());
        }
        Ok(Self {
            simulation,
            periods_per_year: config.periods_per_year,
            bars: data.bars,
            dataset_hash: data.dataset_hash,
        })
    }

    fn sources(&self) -> Vec<Box<dyn BarSource + '_>> {
        self.bars
            .iter()
            .map(|(symbol, bars)| {
                Box::new(HistoricalBars::new(symbol.as_str(), bars.clone())) as Box<dyn BarSource>
            })
            .collect()
    }
}

/// Complete result of one backtest. Serializes identically for identical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy: String,
    pub config: StrategyConfig,
    pub parameters: ParameterSet,
    pub fingerprint: String,
    pub status: SimulatorState,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub rejections: BTreeMap<RejectionReason, usize>,
    pub symbols: Vec<String>,
    pub initial_cash: f64,
    pub final_balance: f64,
    pub signal_count: usize,
    pub bar_count: usize,
    pub warmup_bars: usize,
    pub dataset_hash: String,
}

impl BacktestResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}

/// Run one strategy configuration over the context's bars.
pub fn run_backtest(
    ctx: &BacktestContext,
    strategy_config: &StrategyConfig,
) -> Result<BacktestResult, RunError> {
    let strategy = strategy_config.build()?;
    let mut simulator = Simulator::new(ctx.simulation.clone(), strategy.as_ref());
    let output = simulator.run(ctx.sources())?;

    let mut equity: Vec<f64> = Vec::with_capacity(output.equity_curve.len() + 1);
    equity.push(output.initial_cash);
    equity.extend(output.equity_curve.iter().map(|p| p.equity));
    let metrics = PerformanceMetrics::compute(&equity, &output.trades, ctx.periods_per_year);

    let parameters = strategy_config.to_parameter_set();
    tracing::debug!(
        strategy = strategy.name(),
        fingerprint = %parameters.fingerprint(),
        trades = output.trades.len(),
        sharpe = metrics.sharpe,
        "backtest finished"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        strategy: strategy.name().to_string(),
        config: strategy_config.clone(),
        fingerprint: parameters.fingerprint(),
        parameters,
        status: simulator.state(),
        metrics,
        equity_curve: output.equity_curve,
        trades: output.trades,
        rejections: output.rejections,
        symbols: ctx.bars.keys().cloned().collect(),
        initial_cash: output.initial_cash,
        final_balance: output.final_balance,
        signal_count: output.signal_count,
        bar_count: output.bar_count,
        warmup_bars: strategy.warmup_bars(),
        dataset_hash: ctx.dataset_hash.clone(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use sophia_core::domain::SymbolSpec;

    /// Daily sine wave on a slow upward drift.
    pub(crate) fn wave(symbol: &str, n: usize) -> Vec<Bar> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut prev = 100.0;
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.12).sin() * 15.0 + i as f64 * 0.05;
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

    pub(crate) fn context() -> BacktestContext {
        let config = SophiaConfig {
            symbols: vec![SymbolSpec {
                contract_size: 1.0,
                ..SymbolSpec::new("AAA")
            }],
            ..SophiaConfig::default()
        };
        let data = LoadedData::new(BTreeMap::from([("AAA".to_string(), wave("AAA", 250))]));
        BacktestContext::new(&config, data).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{context, wave};
    use super::*;
    use sophia_core::strategy::{StrategyKind, TurtleParams};

    #[test]
    fn run_produces_metrics_and_provenance() {
        let ctx = context();
        let cfg = StrategyConfig::Turtle(TurtleParams {
            entry_period: 10,
            exit_period: 5,
            ..TurtleParams::default()
        });
        let result = run_backtest(&ctx, &cfg).unwrap();
        assert_eq!(result.status, SimulatorState::Completed);
        assert_eq!(result.strategy, "turtle");
        assert_eq!(result.bar_count, 250);
        assert_eq!(result.equity_curve.len(), 250);
        assert_eq!(result.metrics.trade_count, result.trades.len());
        assert_eq!(result.fingerprint, cfg.to_parameter_set().fingerprint());
        assert_eq!(result.dataset_hash, ctx.dataset_hash);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
        let last = result.equity_curve.last().unwrap().equity;
        assert_eq!(last, result.final_balance);
    }

    #[test]
    fn invalid_strategy_is_config_error() {
        let ctx = context();
        let cfg = StrategyConfig::Turtle(TurtleParams {
            entry_period: 0,
            ..TurtleParams::default()
        });
        assert!(matches!(run_backtest(&ctx, &cfg), Err(RunError::Config(_))));
    }

    #[test]
    fn loaded_symbol_needs_spec() {
        let data = LoadedData::new(BTreeMap::from([("ZZZ".to_string(), wave("ZZZ", 10))]));
        let err = BacktestContext::new(&SophiaConfig::default(), data).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::UnknownSymbol(ref s)) if s == "ZZZ"
        ));
    }

    #[test]
    fn empty_data_rejected() {
        let err = BacktestContext::new(&SophiaConfig::default(), LoadedData::new(BTreeMap::new()))
            .unwrap_err();
        assert!(matches!(err, RunError::NoData));
    }

    #[test]
    fn both_strategies_run() {
        let ctx = context();
        for kind in [StrategyKind::Turtle, StrategyKind::EmaCrossover] {
            let result = run_backtest(&ctx, &kind.default_config()).unwrap();
            assert_eq!(result.config.kind(), kind);
            assert!(result.metrics.max_drawdown <= 0.0);
        }
    }
}
