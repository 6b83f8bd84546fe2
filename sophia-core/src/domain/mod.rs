//! Domain types for Sophia

pub mod account;
pub mod bar;
pub mod position;
pub mod symbol;
pub mod trade;

pub use account::{AccountError, AccountState, ClosedPosition};
pub use bar::Bar;
pub use position::{Position, PositionSide};
pub use symbol::{SymbolSpec, SymbolSpecError};
pub use trade::{ExitReason, TradeRecord};
