// In crates/database/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Someone else wrote the key since it was read. The persisted value was left untouched.
    #[error("Concurrent modification of '{key}': expected version {expected}, found {actual}")]
    ConcurrentModification { key: String, expected: String, actual: String },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to (de)serialize stored payload")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O failed")]
    Io(#[from] std::io::Error),

    #[error("Database operation failed")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    /// The stored payload parsed but does not describe a valid state.
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConcurrentModification { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
