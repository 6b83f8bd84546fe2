//! Sophia Runner: backtest orchestration, parameter search and artifacts.
//!
//! This crate builds on `sophia-core` to provide:
//! - TOML configuration for account, risk, symbols, strategy and optimizer
//! - CSV bar loading with validation and dataset hashing
//! - Single-backtest runner with performance metrics
//! - Grid and genetic parameter search ranked by a fitness metric
//! - JSON, CSV and Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod fitness;
pub mod metrics;
pub mod optimizer;
pub mod runner;

pub use config::{ConfigFileError, OptimizerConfig, SophiaConfig};
pub use data_loader::{load_csv, load_symbols, LoadError, LoadedData};
pub use fitness::FitnessMetric;
pub use metrics::PerformanceMetrics;
pub use optimizer::{
    optimize, GeneticConfig, OptimizationReport, ParamGrid, RankedCandidate, SearchMethod,
};
pub use runner::{run_backtest, BacktestContext, BacktestResult, RunError, SCHEMA_VERSION};
