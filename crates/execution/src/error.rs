// In crates/execution/src/error.rs

use core_types::Symbol;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The exchange answered and nothing traded.
    #[error("Order for {symbol} failed: {reason}")]
    OrderFailed { symbol: Symbol, reason: String },

    /// No answer within the deadline. The order is treated as not filled.
    #[error("Order for {symbol} timed out after {after:?}")]
    OrderTimeout { symbol: Symbol, after: Duration },

    #[error("API client error: {0}")]
    Exchange(#[from] api_client::Error),

    #[error("Budget error: {0}")]
    Budget(#[from] risk::Error),

    /// The decision does not fit the symbol's current state.
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),
}

pub type Result<T> = std::result::Result<T, Error>;
