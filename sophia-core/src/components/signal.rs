//! Signals: the immutable output of one strategy evaluation on one bar.

use crate::domain::{Bar, PositionSide};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the strategy wants to do on this bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Long,
    Short,
    /// Nothing to do (also emitted during warm-up or when indicators are undefined).
    Flat,
    /// Close the open position.
    Exit,
}

impl SignalDirection {
    pub fn is_entry(self) -> bool {
        matches!(self, Self::Long | Self::Short)
    }

    /// Position side an entry opens. `None` for Flat and Exit.
    pub fn entry_side(self) -> Option<PositionSide> {
        match self {
            Self::Long => Some(PositionSide::Long),
            Self::Short => Some(PositionSide::Short),
            Self::Flat | Self::Exit => None,
        }
    }
}

impl From<PositionSide> for SignalDirection {
    fn from(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Self::Long,
            PositionSide::Short => Self::Short,
        }
    }
}

/// One strategy decision for one bar of one symbol.
///
/// `price` is the close the decision was taken on; stop and take-profit are
/// absolute price levels derived from it. `risk_unit` is the ATR-scaled stop
/// distance used for volatility-normalized sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub bar_index: usize,
    pub direction: SignalDirection,
    /// Conviction in [0, 1]. Zero for Flat.
    pub strength: f64,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_unit: Option<f64>,
    pub reason: String,
    /// Indicator snapshot behind the decision (channel level, ATR, RSI...).
    pub metadata: BTreeMap<String, f64>,
}

impl Signal {
    /// A no-op signal for `bar`.
    pub fn flat(bar: &Bar, bar_index: usize, reason: impl Into<String>) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            bar_index,
            direction: SignalDirection::Flat,
            strength: 0.0,
            price: bar.close,
            stop_loss: None,
            take_profit: None,
            risk_unit: None,
            reason: reason.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// An exit request for the open position in `bar.symbol`.
    pub fn exit(bar: &Bar, bar_index: usize, reason: impl Into<String>) -> Self {
        Self {
            direction: SignalDirection::Exit,
            strength: 1.0,
            ..Self::flat(bar, bar_index, reason)
        }
    }

    /// An entry with ATR-based protective levels.
    ///
    /// stop = price ∓ risk_unit, take-profit = price ± risk_unit × reward_multiple.
    pub fn entry(
        bar: &Bar,
        bar_index: usize,
        side: PositionSide,
        risk_unit: f64,
        reward_multiple: f64,
        reason: impl Into<String>,
    ) -> Self {
        let sign = side.sign();
        Self {
            direction: side.into(),
            strength: 1.0,
            stop_loss: Some(bar.close - sign * risk_unit),
            take_profit: Some(bar.close + sign * risk_unit * reward_multiple),
            risk_unit: Some(risk_unit),
            ..Self::flat(bar, bar_index, reason)
        }
    }

    pub fn with_metadata(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_flat(&self) -> bool {
        self.direction == SignalDirection::Flat
    }
}
