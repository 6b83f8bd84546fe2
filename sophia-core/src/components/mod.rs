//! Shared building blocks between the indicator library and the strategies.

pub mod indicator;
pub mod signal;

pub use indicator::{precompute_indicators, Indicator, IndicatorValues};
pub use signal::{Signal, SignalDirection};
