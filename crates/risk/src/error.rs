// In crates/risk/src/error.rs

use core_types::Symbol;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Budget exceeded for {symbol}: requested {requested}, available {available}")]
    BudgetExceeded {
        symbol: Symbol,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;
