// In crates/engine/src/error.rs

use thiserror::Error;

/// Errors that end a cycle early. Everything else is recorded per symbol and the cycle goes on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load trading state: {0}")]
    StateLoad(#[source] database::Error),

    #[error("Failed to save trading state: {0}")]
    StateSave(#[source] database::Error),

    #[error("Invalid strategy configuration: {0}")]
    Strategy(#[from] strategies::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
