//! Live driver: the same decision path as the simulator, fed one bar at a time.
//!
//! The driver keeps the bar history for its symbol, recomputes indicators on
//! every new bar and hands actionable intents to an [`OrderSink`]. Fills and
//! account updates come back from the broker side, so the caller passes the
//! current account snapshot into each step.

use crate::components::{precompute_indicators, Indicator, IndicatorValues, Signal};
use crate::domain::{AccountState, Bar, SymbolSpec};
use crate::risk::{OrderIntent, RiskConfig};
use crate::strategy::Strategy;

use super::simulator::{decide, EngineError};
use super::sink::OrderSink;
use super::source::BarSource;

/// Outcome of one live step.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveDecision {
    pub signal: Signal,
    pub intent: OrderIntent,
    pub submitted: bool,
}

/// Steps one symbol through `decide`.
///
/// Every bar received is kept, and each step recomputes the indicators over
/// the whole history so EMA seeding matches a batch run. Memory and per-step
/// cost therefore grow linearly with the session length; restart the driver
/// (replaying a warm-up window) for long-running sessions.
pub struct LiveDriver<'a, S: BarSource, K: OrderSink> {
    strategy: &'a dyn Strategy,
    indicators: Vec<Box<dyn Indicator>>,
    spec: SymbolSpec,
    risk: RiskConfig,
    source: S,
    sink: K,
    history: Vec<Bar>,
}

impl<'a, S: BarSource, K: OrderSink> LiveDriver<'a, S, K> {
    pub fn new(
        strategy: &'a dyn Strategy,
        spec: SymbolSpec,
        risk: RiskConfig,
        source: S,
        sink: K,
    ) -> Result<Self, EngineError> {
        spec.validate().map_err(crate::params::ConfigError::from)?;
        risk.validate()?;
        if source.symbol() != spec.symbol {
            return Err(EngineError::UnknownSymbol(source.symbol().to_string()));
        }
        Ok(Self {
            indicators: strategy.indicators(),
            strategy,
            spec,
            risk,
            source,
            sink,
            history: Vec::new(),
        })
    }

    /// Pull the next bar and decide on it. `Ok(None)` once the source is exhausted.
    ///
    /// O(history) per call: indicators are rebuilt from the first bar.
    pub fn step(&mut self, account: &AccountState) -> Result<Option<LiveDecision>, EngineError> {
        let Some(bar) = self.source.next_bar()? else {
            return Ok(None);
        };
        self.history.push(bar);
        let i = self.history.len() - 1;
        let values: IndicatorValues = precompute_indicators(&self.history, &self.indicators);
        let (signal, intent) = decide(
            self.strategy,
            &self.history,
            i,
            &values,
            account,
            &self.spec,
            &self.risk,
        );
        let submitted = intent.is_actionable();
        if submitted {
            self.sink.submit(&intent)?;
            tracing::info!(
                symbol = %intent.symbol,
                direction = ?intent.direction,
                size = intent.size,
                "intent submitted"
            );
        }
        Ok(Some(LiveDecision {
            signal,
            intent,
            submitted,
        }))
    }

    pub fn history(&self) -> &[Bar] {
        &self.history
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}
