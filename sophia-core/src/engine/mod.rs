//! Execution: bar sources, order sinks, the historical simulator and the live driver.

pub mod live;
pub mod simulator;
pub mod sink;
pub mod source;

pub use live::{LiveDecision, LiveDriver};
pub use simulator::{
    decide, EngineError, EquityPoint, SimulationConfig, SimulationOutput, Simulator,
    SimulatorState,
};
pub use sink::{OrderSink, SinkError};
pub use source::{drain, validate_sequence, BarSource, DataError, HistoricalBars};
