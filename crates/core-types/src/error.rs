// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Trading state violates an invariant: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;
