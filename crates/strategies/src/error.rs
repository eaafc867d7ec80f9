// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient data: need {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Candles are not in strictly increasing open_time order at index {index}")]
    UnorderedCandles { index: usize },

    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;
