//! Historical execution simulator.
//!
//! Per timestamp on the merged timeline of all symbols:
//! 1. Roll the trading day (daily loss reset, starting equity).
//! 2. Fill intents queued on each symbol's previous bar at this bar's open.
//! 3. Check stop-loss / take-profit against the bar range (stop first).
//! 4. Mark open positions at the close.
//! 5. Evaluate the strategy, size and gate, queue accepted intents.
//! 6. Update peak equity and record the equity point.
//!
//! On the last timestamp step 5 is replaced by liquidating every open position
//! at its last close; intents still queued are dropped.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::components::{precompute_indicators, IndicatorValues, Signal, SignalDirection};
use crate::domain::{
    AccountError, AccountState, Bar, ClosedPosition, ExitReason, Position, PositionSide,
    SymbolSpec, TradeRecord,
};
use crate::params::ConfigError;
use crate::risk::{size_and_gate, OrderIntent, RejectionReason, RiskConfig};
use crate::strategy::{PositionState, Strategy};

use super::source::{drain, BarSource, DataError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("simulator is {0:?}, expected Idle")]
    InvalidState(SimulatorState),

    #[error("no symbol spec for '{0}'")]
    UnknownSymbol(String),

    #[error("order sink: {0}")]
    Sink(#[from] super::sink::SinkError),
}

/// Lifecycle of one simulator. A simulator runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatorState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Everything a run needs besides the strategy and the bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_cash: f64,
    pub risk: RiskConfig,
    pub symbols: Vec<SymbolSpec>,
}

impl SimulationConfig {
    pub fn new(initial_cash: f64, symbols: Vec<SymbolSpec>) -> Self {
        Self {
            initial_cash,
            risk: RiskConfig::default(),
            symbols,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(ConfigError::InvalidRisk {
                field: "initial_cash",
                reason: format!("must be > 0, got {}", self.initial_cash),
            });
        }
        self.risk.validate()?;
        for spec in &self.symbols {
            spec.validate()?;
        }
        Ok(())
    }

    pub fn spec(&self, symbol: &str) -> Option<&SymbolSpec> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Result of one simulation. Deterministic for identical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub initial_cash: f64,
    pub final_balance: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub rejections: BTreeMap<RejectionReason, usize>,
    /// Every non-flat signal, in evaluation order.
    pub signals: Vec<Signal>,
    /// Non-flat signals produced (entries and exits).
    pub signal_count: usize,
    /// Timestamps on the merged timeline.
    pub bar_count: usize,
}

/// Strategy evaluation plus risk gating for one bar of one symbol.
///
/// The simulator and the live driver both go through this function, so identical
/// inputs give identical signals and intents in either mode.
pub fn decide(
    strategy: &dyn Strategy,
    bars: &[Bar],
    bar_index: usize,
    indicators: &IndicatorValues,
    account: &AccountState,
    spec: &SymbolSpec,
    risk: &RiskConfig,
) -> (Signal, OrderIntent) {
    let symbol = &bars[bar_index].symbol;
    let position = account.position(symbol).map(PositionState::from);
    let signal = strategy.evaluate(bars, bar_index, indicators, position.as_ref());
    let intent = size_and_gate(&signal, account, spec, risk);
    (signal, intent)
}

/// Per-symbol replay state.
struct SymbolTrack {
    spec: SymbolSpec,
    bars: Vec<Bar>,
    indicators: IndicatorValues,
    cursor: usize,
    pending: Option<OrderIntent>,
}

pub struct Simulator<'a> {
    config: SimulationConfig,
    strategy: &'a dyn Strategy,
    state: SimulatorState,
}

impl<'a> Simulator<'a> {
    pub fn new(config: SimulationConfig, strategy: &'a dyn Strategy) -> Self {
        Self {
            config,
            strategy,
            state: SimulatorState::Idle,
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Run over one source per symbol. Consumes the simulator's single run.
    pub fn run(
        &mut self,
        sources: Vec<Box<dyn BarSource + '_>>,
    ) -> Result<SimulationOutput, EngineError> {
        if self.state != SimulatorState::Idle {
            return Err(EngineError::InvalidState(self.state));
        }
        self.state = SimulatorState::Running;
        match self.execute(sources) {
            Ok(output) => {
                self.state = SimulatorState::Completed;
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(error = %e, strategy = self.strategy.name(), "simulation failed");
                self.state = SimulatorState::Failed;
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        sources: Vec<Box<dyn BarSource + '_>>,
    ) -> Result<SimulationOutput, EngineError> {
        self.config.validate()?;

        let indicator_set = self.strategy.indicators();
        let mut tracks: BTreeMap<String, SymbolTrack> = BTreeMap::new();
        for mut source in sources {
            let symbol = source.symbol().to_string();
            let spec = self
                .config
                .spec(&symbol)
                .cloned()
                .ok_or_else(|| EngineError::UnknownSymbol(symbol.clone()))?;
            let bars = drain(source.as_mut())?;
            let indicators = precompute_indicators(&bars, &indicator_set);
            tracks.insert(
                symbol,
                SymbolTrack {
                    spec,
                    bars,
                    indicators,
                    cursor: 0,
                    pending: None,
                },
            );
        }

        let timeline: BTreeSet<NaiveDateTime> = tracks
            .values()
            .flat_map(|t| t.bars.iter().map(|b| b.timestamp))
            .collect();
        let last_ts = timeline.iter().next_back().copied();

        let mut run = RunState::new(self.config.initial_cash, timeline.len());
        tracing::debug!(
            strategy = self.strategy.name(),
            symbols = tracks.len(),
            bars = timeline.len(),
            "simulation started"
        );

        for ts in timeline.iter().copied() {
            run.account.roll_day(ts.date());

            // Symbols with a bar at this timestamp, with their local index.
            let active: Vec<(String, usize)> = tracks
                .iter()
                .filter_map(|(sym, t)| {
                    t.bars
                        .get(t.cursor)
                        .filter(|b| b.timestamp == ts)
                        .map(|_| (sym.clone(), t.cursor))
                })
                .collect();

            for (symbol, i) in &active {
                let Some(track) = tracks.get_mut(symbol) else {
                    continue;
                };
                let bar = &track.bars[*i];
                if let Some(intent) = track.pending.take() {
                    run.fill(&intent, bar, *i, &track.spec, &self.config.risk)?;
                }
                run.check_protective_exits(bar, *i, &track.spec);
                run.account.mark(symbol, bar.close);
            }

            if Some(ts) == last_ts {
                for track in tracks.values_mut() {
                    track.pending = None;
                    let last = track.bars.len() - 1;
                    let bar = &track.bars[track.cursor.min(last)];
                    run.close(
                        &bar.symbol,
                        bar.close,
                        bar,
                        track.cursor.min(last),
                        &track.spec,
                        ExitReason::EndOfData,
                    );
                }
            } else {
                for (symbol, i) in &active {
                    let Some(track) = tracks.get_mut(symbol) else {
                        continue;
                    };
                    let (signal, intent) = decide(
                        self.strategy,
                        &track.bars,
                        *i,
                        &track.indicators,
                        &run.account,
                        &track.spec,
                        &self.config.risk,
                    );
                    run.record_decision(signal, &intent);
                    if intent.is_actionable() {
                        track.pending = Some(intent);
                    }
                }
            }

            for (symbol, _) in &active {
                if let Some(track) = tracks.get_mut(symbol) {
                    track.cursor += 1;
                }
            }

            run.account.update_peak();
            run.equity_curve.push(EquityPoint {
                timestamp: ts,
                equity: run.account.equity(),
            });
            run.debug_check_ledger(self.config.initial_cash);
        }

        tracing::debug!(
            strategy = self.strategy.name(),
            trades = run.trades.len(),
            final_equity = run.account.equity(),
            "simulation finished"
        );

        Ok(SimulationOutput {
            initial_cash: self.config.initial_cash,
            final_balance: run.account.balance,
            equity_curve: run.equity_curve,
            trades: run.trades,
            rejections: run.rejections,
            signal_count: run.signals.len(),
            signals: run.signals,
            bar_count: timeline.len(),
        })
    }
}

/// Mutable ledger of one run.
struct RunState {
    account: AccountState,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<TradeRecord>,
    rejections: BTreeMap<RejectionReason, usize>,
    signals: Vec<Signal>,
}

impl RunState {
    fn new(initial_cash: f64, bars: usize) -> Self {
        Self {
            account: AccountState::new(initial_cash),
            equity_curve: Vec::with_capacity(bars),
            trades: Vec::new(),
            rejections: BTreeMap::new(),
            signals: Vec::new(),
        }
    }

    fn record_decision(&mut self, signal: Signal, intent: &OrderIntent) {
        if let Some(reason) = intent.rejection {
            *self.rejections.entry(reason).or_default() += 1;
        }
        if !signal.is_flat() {
            self.signals.push(signal);
        }
    }

    /// Fill a queued intent at `bar.open`, paying half the spread and commission.
    fn fill(
        &mut self,
        intent: &OrderIntent,
        bar: &Bar,
        bar_index: usize,
        spec: &SymbolSpec,
        risk: &RiskConfig,
    ) -> Result<(), EngineError> {
        let half_spread = spec.spread / 2.0;
        match intent.direction.entry_side() {
            None if intent.direction == SignalDirection::Exit => {
                self.close(&intent.symbol, bar.open, bar, bar_index, spec, ExitReason::Signal);
                Ok(())
            }
            None => Ok(()),
            Some(side) => {
                if self.account.has_position(&intent.symbol) {
                    return Ok(());
                }
                // Other symbols may have filled earlier on this timestamp.
                let reason = if self.account.open_position_count() >= risk.max_positions {
                    Some(RejectionReason::MaxPositions)
                } else {
                    spec.correlation_group
                        .as_deref()
                        .filter(|g| self.account.correlated_count(g) >= risk.max_correlated)
                        .map(|_| RejectionReason::CorrelationLimit)
                };
                if let Some(reason) = reason {
                    tracing::debug!(symbol = %intent.symbol, reason = %reason, "entry dropped at fill");
                    *self.rejections.entry(reason).or_default() += 1;
                    return Ok(());
                }

                let price = bar.open + side.sign() * half_spread;
                let commission = spec.commission(intent.size);
                self.account.open_position(Position {
                    symbol: intent.symbol.clone(),
                    side,
                    size: intent.size,
                    entry_price: price,
                    stop_loss: intent.stop_loss,
                    take_profit: intent.take_profit,
                    opened_at: bar.timestamp,
                    entry_bar: bar_index,
                    contract_size: spec.contract_size,
                    correlation_group: spec.correlation_group.clone(),
                    entry_commission: commission,
                    mark: bar.open,
                })?;
                tracing::debug!(
                    symbol = %intent.symbol,
                    side = ?side,
                    size = intent.size,
                    price,
                    "entry filled"
                );
                Ok(())
            }
        }
    }

    /// Stop-loss and take-profit against the bar range. When both are touched
    /// the stop wins; a gap through a level fills at the open.
    fn check_protective_exits(&mut self, bar: &Bar, bar_index: usize, spec: &SymbolSpec) {
        let Some(pos) = self.account.position(&bar.symbol) else {
            return;
        };
        let hit = match pos.side {
            PositionSide::Long => {
                if let Some(stop) = pos.stop_loss.filter(|s| bar.low <= *s) {
                    Some((bar.open.min(stop), ExitReason::StopLoss))
                } else {
                    pos.take_profit
                        .filter(|tp| bar.high >= *tp)
                        .map(|tp| (bar.open.max(tp), ExitReason::TakeProfit))
                }
            }
            PositionSide::Short => {
                if let Some(stop) = pos.stop_loss.filter(|s| bar.high >= *s) {
                    Some((bar.open.max(stop), ExitReason::StopLoss))
                } else {
                    pos.take_profit
                        .filter(|tp| bar.low <= *tp)
                        .map(|tp| (bar.open.min(tp), ExitReason::TakeProfit))
                }
            }
        };
        if let Some((price, reason)) = hit {
            self.close(&bar.symbol, price, bar, bar_index, spec, reason);
        }
    }

    /// Close at mid `price` less half the spread. No-op when flat.
    fn close(
        &mut self,
        symbol: &str,
        price: f64,
        bar: &Bar,
        bar_index: usize,
        spec: &SymbolSpec,
        reason: ExitReason,
    ) {
        let Some(side) = self.account.position(symbol).map(|p| p.side) else {
            return;
        };
        let exit_price = price - side.sign() * spec.spread / 2.0;
        let size = self.account.position(symbol).map_or(0.0, |p| p.size);
        let Some(closed) = self
            .account
            .close_position(symbol, exit_price, spec.commission(size))
        else {
            return;
        };
        tracing::debug!(
            symbol,
            reason = ?reason,
            price = exit_price,
            net_pnl = closed.net_pnl,
            "position closed"
        );
        self.trades.push(trade_record(closed, bar, bar_index, reason));
    }

    /// balance == initial cash + realized net P&L - entry commissions of open positions,
    /// and equity == balance + each open position marked at its last close.
    fn debug_check_ledger(&self, initial_cash: f64) {
        if cfg!(debug_assertions) {
            let realized: f64 = self.trades.iter().map(|t| t.net_pnl).sum();
            let open_costs: f64 = self
                .account
                .positions
                .values()
                .map(|p| p.entry_commission)
                .sum();
            let expected = initial_cash + realized - open_costs;
            let tolerance = 1e-6 * initial_cash.abs().max(1.0);
            debug_assert!(
                (self.account.balance - expected).abs() <= tolerance,
                "ledger mismatch: balance={} expected={expected}",
                self.account.balance
            );
            let marked: f64 = self
                .account
                .positions
                .values()
                .map(|p| p.side.sign() * (p.mark - p.entry_price) * p.size * p.contract_size)
                .sum();
            let equity = self.account.equity();
            debug_assert!(
                (equity - (self.account.balance + marked)).abs() <= tolerance,
                "equity mismatch: equity={equity} balance={} marked={marked}",
                self.account.balance
            );
        }
    }
}

fn trade_record(closed: ClosedPosition, bar: &Bar, bar_index: usize, reason: ExitReason) -> TradeRecord {
    let p = closed.position;
    TradeRecord {
        symbol: p.symbol,
        side: p.side,
        entry_bar: p.entry_bar,
        entry_time: p.opened_at,
        entry_price: p.entry_price,
        exit_bar: bar_index,
        exit_time: bar.timestamp,
        exit_price: closed.exit_price,
        exit_reason: reason,
        size: p.size,
        contract_size: p.contract_size,
        gross_pnl: closed.gross_pnl,
        commission: p.entry_commission + closed.exit_commission,
        net_pnl: closed.net_pnl,
        bars_held: bar_index - p.entry_bar,
    }
}
