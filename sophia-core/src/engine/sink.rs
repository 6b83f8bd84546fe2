//! Order sink: where accepted intents leave the core (broker adapter, recorder).

use thiserror::Error;

use crate::risk::OrderIntent;

#[derive(Debug, Error, PartialEq)]
pub enum SinkError {
    #[error("order refused by broker: {0}")]
    Refused(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

pub trait OrderSink {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), SinkError>;
}

/// Recording sink, used for dry runs and tests.
impl OrderSink for Vec<OrderIntent> {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), SinkError> {
        self.push(intent.clone());
        Ok(())
    }
}
