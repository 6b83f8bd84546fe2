use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract metadata for a tradable symbol.
///
/// Sizes are expressed in lots; one lot moves `contract_size` units of account
/// currency per unit of price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolSpec {
    pub symbol: String,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
    #[serde(default = "default_lot_step")]
    pub lot_step: f64,
    #[serde(default = "default_min_lot")]
    pub min_lot: f64,
    #[serde(default = "default_max_lot")]
    pub max_lot: f64,
    /// Full bid/ask spread in price units. Fills pay half of it on each side.
    #[serde(default)]
    pub spread: f64,
    #[serde(default)]
    pub commission_per_lot: f64,
    /// Symbols sharing a group count against `max_correlated`.
    #[serde(default)]
    pub correlation_group: Option<String>,
}

fn default_contract_size() -> f64 {
    100_000.0
}

fn default_lot_step() -> f64 {
    0.01
}

fn default_min_lot() -> f64 {
    0.01
}

fn default_max_lot() -> f64 {
    10.0
}

impl SymbolSpec {
    /// Spec with standard FX lot conventions and no costs.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            contract_size: default_contract_size(),
            lot_step: default_lot_step(),
            min_lot: default_min_lot(),
            max_lot: default_max_lot(),
            spread: 0.0,
            commission_per_lot: 0.0,
            correlation_group: None,
        }
    }

    /// Round a raw size down to the lot step and cap at `max_lot`.
    ///
    /// Rounding down keeps realized risk at or below the requested amount.
    pub fn round_lots_down(&self, size: f64) -> f64 {
        if !size.is_finite() || size <= 0.0 {
            return 0.0;
        }
        let steps = (size / self.lot_step + 1e-9).floor();
        let rounded = steps * self.lot_step;
        // Strip binary noise from the multiplication (0.07 * 3 etc.)
        let rounded = (rounded * 1e8).round() / 1e8;
        rounded.min(self.max_lot)
    }

    /// Commission for one side of a fill of `size` lots.
    pub fn commission(&self, size: f64) -> f64 {
        self.commission_per_lot * size
    }

    pub fn validate(&self) -> Result<(), SymbolSpecError> {
        let positive = [
            ("contract_size", self.contract_size),
            ("lot_step", self.lot_step),
            ("min_lot", self.min_lot),
            ("max_lot", self.max_lot),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SymbolSpecError::NonPositive {
                    symbol: self.symbol.clone(),
                    field,
                    value,
                });
            }
        }
        if self.min_lot > self.max_lot {
            return Err(SymbolSpecError::LotBounds {
                symbol: self.symbol.clone(),
                min_lot: self.min_lot,
                max_lot: self.max_lot,
            });
        }
        if self.spread < 0.0 || self.commission_per_lot < 0.0 {
            return Err(SymbolSpecError::NegativeCost(self.symbol.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SymbolSpecError {
    #[error("{symbol}: {field} must be > 0, got {value}")]
    NonPositive {
        symbol: String,
        field: &'static str,
        value: f64,
    },

    #[error("{symbol}: min_lot {min_lot} exceeds max_lot {max_lot}")]
    LotBounds {
        symbol: String,
        min_lot: f64,
        max_lot: f64,
    },

    #[error("{0}: spread and commission must be >= 0")]
    NegativeCost(String),
}
