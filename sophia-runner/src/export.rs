//! Artifact export: JSON results, CSV trade tapes and equity curves, Markdown summaries.
//!
//! Persisted JSON carries a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sophia_core::domain::TradeRecord;
use sophia_core::engine::EquityPoint;

use crate::optimizer::OptimizationReport;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

pub fn export_report_json(report: &OptimizationReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize OptimizationReport to JSON")
}

pub fn import_report_json(json: &str) -> Result<OptimizationReport> {
    let report: OptimizationReport = serde_json::from_str(json)
        .context("failed to deserialize OptimizationReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: symbol, side, entry_bar, entry_time, entry_price, exit_bar,
/// exit_time, exit_price, exit_reason, size, gross_pnl, commission, net_pnl,
/// bars_held
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "side",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "exit_reason",
        "size",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.symbol,
            &format!("{:?}", t.side),
            &t.entry_bar.to_string(),
            &t.entry_time.format(TIME_FORMAT).to_string(),
            &format!("{:.6}", t.entry_price),
            &t.exit_bar.to_string(),
            &t.exit_time.format(TIME_FORMAT).to_string(),
            &format!("{:.6}", t.exit_price),
            &format!("{:?}", t.exit_reason),
            &format!("{:.4}", t.size),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.net_pnl),
            &t.bars_held.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for p in equity_curve {
        wtr.write_record([
            &p.timestamp.format(TIME_FORMAT).to_string(),
            &format!("{:.2}", p.equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Ranked optimizer candidates, one row each, parameters as `name=value;...`.
pub fn export_ranked_csv(report: &OptimizationReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "score",
        "total_return",
        "sharpe",
        "max_drawdown",
        "trade_count",
        "fingerprint",
        "parameters",
        "error",
    ])?;
    for c in &report.candidates {
        let (ret, sharpe, dd, trades) = match &c.metrics {
            Some(m) => (
                format!("{:.6}", m.total_return),
                format!("{:.4}", m.sharpe),
                format!("{:.6}", m.max_drawdown),
                m.trade_count.to_string(),
            ),
            None => Default::default(),
        };
        let params = c
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        wtr.write_record([
            &c.rank.to_string(),
            &format!("{:.6}", c.score),
            &ret,
            &sharpe,
            &dd,
            &trades,
            &c.fingerprint,
            &params,
            c.error.as_deref().unwrap_or(""),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `result.json`, `trades.csv`, `equity.csv` and `report.md` into `dir`.
pub fn save_artifacts(result: &BacktestResult, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    write_file(&dir.join("result.json"), &export_json(result)?)?;
    write_file(&dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    write_file(&dir.join("equity.csv"), &export_equity_csv(&result.equity_curve)?)?;
    write_file(&dir.join("report.md"), &generate_report(result))?;

    tracing::info!(dir = %dir.display(), "artifacts written");
    Ok(dir.to_path_buf())
}

/// Write `optimization.json` and `ranked.csv` into `dir`.
pub fn save_report(report: &OptimizationReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
    write_file(&dir.join("optimization.json"), &export_report_json(report)?)?;
    write_file(&dir.join("ranked.csv"), &export_ranked_csv(report)?)?;
    tracing::info!(dir = %dir.display(), "optimization report written");
    Ok(dir.to_path_buf())
}

pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown ───────────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let m = &result.metrics;
    let mut md = String::with_capacity(1024);

    md.push_str("# Backtest Report\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Strategy | {} |\n", result.strategy));
    md.push_str(&format!("| Symbols | {} |\n", result.symbols.join(", ")));
    md.push_str(&format!(
        "| Bars | {} ({} warmup) |\n",
        result.bar_count, result.warmup_bars
    ));
    md.push_str(&format!("| Signals | {} |\n", result.signal_count));
    md.push_str(&format!("| Initial Cash | {:.2} |\n", result.initial_cash));
    md.push_str(&format!("| Final Balance | {:.2} |\n", result.final_balance));
    md.push_str(&format!("| Fingerprint | {} |\n", result.fingerprint));
    md.push_str(&format!("| Dataset Hash | {} |\n\n", result.dataset_hash));

    md.push_str("## Parameters\n\n");
    for (name, value) in result.parameters.iter() {
        md.push_str(&format!("- `{name}` = {value}\n"));
    }
    md.push('\n');

    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| CAGR | {:.2}% |\n", m.cagr * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Sortino | {:.3} |\n", m.sortino));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));

    if !result.rejections.is_empty() {
        md.push_str("\n## Risk Rejections\n\n");
        for (reason, count) in &result.rejections {
            md.push_str(&format!("- {reason}: {count}\n"));
        }
    }
    md
}
