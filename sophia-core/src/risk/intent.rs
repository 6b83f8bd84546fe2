//! OrderIntent: the sized, risk-checked output handed to execution.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::components::{Signal, SignalDirection};

use super::guards::RejectionReason;

/// A sized order request. `size == 0` exactly when the request is not actionable;
/// a rejected intent additionally carries the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub bar_index: usize,
    pub direction: SignalDirection,
    /// Lots.
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub rationale: String,
    pub rejection: Option<RejectionReason>,
}

impl OrderIntent {
    pub(crate) fn from_signal(signal: &Signal, size: f64, rationale: impl Into<String>) -> Self {
        Self {
            symbol: signal.symbol.clone(),
            timestamp: signal.timestamp,
            bar_index: signal.bar_index,
            direction: signal.direction,
            size,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            rationale: rationale.into(),
            rejection: None,
        }
    }

    pub(crate) fn rejected(signal: &Signal, reason: RejectionReason, detail: String) -> Self {
        Self {
            rejection: Some(reason),
            ..Self::from_signal(signal, 0.0, detail)
        }
    }

    /// True when there is something to execute.
    pub fn is_actionable(&self) -> bool {
        self.size > 0.0 && self.rejection.is_none()
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}
