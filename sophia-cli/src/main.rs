//! Sophia CLI: backtest, optimize and config validation commands.
//!
//! Commands:
//! - `backtest`: run the configured strategy over CSV bars and save artifacts
//! - `optimize`: grid or genetic parameter search, ranked by a fitness metric
//! - `validate-config`: parse and validate a TOML config without running anything

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sophia_runner::export::{save_artifacts, save_report};
use sophia_runner::{
    load_symbols, optimize, run_backtest, BacktestContext, BacktestResult, FitnessMetric,
    OptimizationReport, SearchMethod, SophiaConfig,
};

#[derive(Parser)]
#[command(
    name = "sophia",
    about = "Sophia: strategy, risk and backtest engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest of the configured strategy.
    Backtest {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Bar data as SYMBOL=PATH (repeatable).
        #[arg(long = "data", value_parser = parse_data_arg, required = true)]
        data: Vec<(String, PathBuf)>,

        /// Output directory for result.json, trades.csv, equity.csv and report.md.
        #[arg(long, default_value = "results")]
        output: PathBuf,
    },
    /// Search the strategy's parameters and rank the candidates.
    Optimize {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Bar data as SYMBOL=PATH (repeatable).
        #[arg(long = "data", value_parser = parse_data_arg, required = true)]
        data: Vec<(String, PathBuf)>,

        /// Fitness metric: sharpe, return, drawdown, profit_factor, sortino, win_rate.
        #[arg(long)]
        metric: Option<FitnessMetric>,

        /// Search method. Overrides `[optimizer] method`.
        #[arg(long, value_enum)]
        method: Option<MethodArg>,

        /// Grid size cap. Overrides `[optimizer] max_combinations`.
        #[arg(long)]
        max_combinations: Option<usize>,

        /// Worker threads. Defaults to all cores.
        #[arg(long)]
        threads: Option<usize>,

        /// Stop dispatching new candidates after this many seconds.
        #[arg(long)]
        time_limit_secs: Option<u64>,

        /// Candidates to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Output directory for optimization.json, ranked.csv and the best run.
        #[arg(long, default_value = "results")]
        output: PathBuf,
    },
    /// Parse and validate a config file.
    ValidateConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Grid,
    Genetic,
}

impl From<MethodArg> for SearchMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Grid => SearchMethod::Grid,
            MethodArg::Genetic => SearchMethod::Genetic,
        }
    }
}

fn parse_data_arg(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((sym, path)) if !sym.trim().is_empty() && !path.trim().is_empty() => {
            Ok((sym.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected SYMBOL=PATH, got '{s}'")),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            config,
            data,
            output,
        } => run_backtest_cmd(&config, &data, &output),
        Commands::Optimize {
            config,
            data,
            metric,
            method,
            max_combinations,
            threads,
            time_limit_secs,
            top,
            output,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(m) = metric {
                cfg.optimizer.metric = m;
            }
            if let Some(m) = method {
                cfg.optimizer.method = m.into();
            }
            if let Some(n) = max_combinations {
                cfg.optimizer.max_combinations = n;
            }
            if threads.is_some() {
                cfg.optimizer.threads = threads;
            }
            run_optimize_cmd(&cfg, &data, time_limit_secs, top, &output)
        }
        Commands::ValidateConfig { config } => {
            let cfg = load_config(&config)?;
            let hash = cfg.config_hash().context("failed to hash config")?;
            println!("{}: ok", config.display());
            println!("Strategy:   {}", cfg.strategy.kind());
            println!("Symbols:    {}", cfg.symbols.len());
            println!("Optimizer:  {:?} by {}", cfg.optimizer.method, cfg.optimizer.metric);
            println!("Hash:       {hash}");
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<SophiaConfig> {
    SophiaConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn build_context(cfg: &SophiaConfig, data: &[(String, PathBuf)]) -> Result<BacktestContext> {
    let loaded = load_symbols(data).context("failed to load bar data")?;
    BacktestContext::new(cfg, loaded).context("failed to prepare backtest")
}

fn run_backtest_cmd(config: &Path, data: &[(String, PathBuf)], output: &Path) -> Result<()> {
    let cfg = load_config(config)?;
    let ctx = build_context(&cfg, data)?;
    let result = run_backtest(&ctx, &cfg.strategy).context("backtest failed")?;

    print_summary(&result);
    let dir = save_artifacts(&result, output)?;
    println!("Artifacts saved to: {}", dir.display());
    Ok(())
}

fn run_optimize_cmd(
    cfg: &SophiaConfig,
    data: &[(String, PathBuf)],
    time_limit_secs: Option<u64>,
    top: usize,
    output: &Path,
) -> Result<()> {
    cfg.optimizer
        .validate(&cfg.strategy)
        .context("invalid optimizer settings")?;
    let ctx = build_context(cfg, data)?;

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(secs) = time_limit_secs {
        let flag = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            flag.store(true, Ordering::Relaxed);
            tracing::warn!(secs, "time limit reached, stopping search");
        });
    }

    let report = optimize(&ctx, &cfg.strategy, &cfg.optimizer, Some(&cancel))
        .context("optimization failed")?;
    print_ranking(&report, top);
    save_report(&report, output)?;

    let Some(best) = report.best_config().context("best candidate is not rebuildable")? else {
        bail!("no candidate produced a valid result");
    };
    let result = run_backtest(&ctx, &best).context("replay of best candidate failed")?;
    print_summary(&result);
    let dir = save_artifacts(&result, &output.join("best"))?;
    println!("Artifacts saved to: {}", dir.display());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Symbols:        {}", result.symbols.join(", "));
    println!(
        "Bars:           {} ({} warmup)",
        result.bar_count, result.warmup_bars
    );
    println!("Signals:        {}", result.signal_count);
    println!("Trades:         {}", m.trade_count);
    println!("Final Balance:  {:.2}", result.final_balance);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Max Consec Win: {}", m.max_consecutive_wins);
    println!("Max Consec Loss:{}", m.max_consecutive_losses);
    for (reason, count) in &result.rejections {
        println!("Rejected:       {count} × {reason}");
    }
}

fn print_ranking(report: &OptimizationReport, top: usize) {
    println!();
    println!(
        "=== {} {:?} search by {} ({} evaluated{}) ===",
        report.strategy,
        report.method,
        report.metric,
        report.evaluated,
        if report.cancelled { ", cancelled" } else { "" }
    );
    for c in report.candidates.iter().take(top) {
        let params = c
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        match &c.error {
            Some(err) => println!("{:>4}  {:>10}  {params}  ({err})", c.rank, "-"),
            None => println!("{:>4}  {:>10.4}  {params}", c.rank, c.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn data_arg_parsing() {
        assert_eq!(
            parse_data_arg("EURUSD=data/eurusd.csv").unwrap(),
            ("EURUSD".to_string(), PathBuf::from("data/eurusd.csv"))
        );
        assert!(parse_data_arg("EURUSD").is_err());
        assert!(parse_data_arg("=x.csv").is_err());
        assert!(parse_data_arg("EURUSD=").is_err());
    }

    #[test]
    fn optimize_overrides_parse() {
        let cli = Cli::try_parse_from([
            "sophia",
            "optimize",
            "--config",
            "c.toml",
            "--data",
            "A=a.csv",
            "--data",
            "B=b.csv",
            "--metric",
            "profit_factor",
            "--method",
            "genetic",
            "--time-limit-secs",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Optimize {
                data,
                metric,
                method,
                time_limit_secs,
                ..
            } => {
                assert_eq!(data.len(), 2);
                assert_eq!(metric, Some(FitnessMetric::ProfitFactor));
                assert!(matches!(method, Some(MethodArg::Genetic)));
                assert_eq!(time_limit_secs, Some(30));
            }
            _ => panic!("expected optimize"),
        }
    }

    #[test]
    fn backtest_requires_data() {
        assert!(Cli::try_parse_from(["sophia", "backtest", "--config", "c.toml"]).is_err());
    }
}
