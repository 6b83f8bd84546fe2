use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

/// An open position. `size` is in lots and is always > 0 while open;
/// direction lives in `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: NaiveDateTime,
    pub entry_bar: usize,
    pub contract_size: f64,
    pub correlation_group: Option<String>,
    /// Commission paid on entry, carried so the closing trade can report it.
    pub entry_commission: f64,
    /// Last observed price used for unrealized P&L.
    pub mark: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::Short
    }

    /// P&L of closing the whole position at `price`, before costs.
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.size * self.contract_size
    }

    /// Unrealized P&L at the current mark.
    pub fn unrealized_pnl(&self) -> f64 {
        self.pnl_at(self.mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "EURUSD".into(),
            side,
            size: 0.5,
            entry_price: 1.1000,
            stop_loss: Some(1.0950),
            take_profit: None,
            opened_at: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            entry_bar: 3,
            contract_size: 100_000.0,
            correlation_group: None,
            entry_commission: 0.0,
            mark: 1.1020,
        }
    }

    #[test]
    fn long_unrealized_pnl() {
        // 0.002 * 0.5 lots * 100k = 100
        let p = position(PositionSide::Long);
        assert!((p.unrealized_pnl() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn short_unrealized_pnl_is_mirrored() {
        let p = position(PositionSide::Short);
        assert!((p.unrealized_pnl() + 100.0).abs() < 1e-6);
        assert!(p.is_short());
    }

    #[test]
    fn side_helpers() {
        assert_eq!(PositionSide::Long.opposite(), PositionSide::Short);
        assert_eq!(PositionSide::Short.sign(), -1.0);
    }
}
