// In crates/database/src/lib.rs

use app_config::types::{StorageBackend, StorageSettings};
use async_trait::async_trait;
use core_types::TradingState;
use serde::Serialize;
use std::fmt;

pub mod error;
pub mod file;
pub mod github;
pub mod memory;
pub mod postgres;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use file::FileStore;
pub use github::GithubStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Opaque version of a stored value. Only the backend that issued it can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// Nothing has been stored under the key yet.
    Absent,
    Tag(String),
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Absent => write!(f, "<absent>"),
            Version::Tag(tag) => write!(f, "{tag}"),
        }
    }
}

/// The capability the trading core needs from durable storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    fn name(&self) -> &'static str;

    /// The current payload and its version, or `None` if the key was never written.
    async fn read(&self, key: &str) -> Result<Option<(String, Version)>>;

    /// Compare-and-swap: replaces the payload only if the stored version still equals `expected`.
    ///
    /// On mismatch returns `Error::ConcurrentModification` and leaves the stored value untouched.
    async fn write(&self, key: &str, payload: &str, expected: &Version) -> Result<Version>;

    /// Appends an immutable record. No version check; names are unique per cycle.
    async fn write_record(&self, name: &str, payload: &str) -> Result<()>;
}

/// A freshly loaded state together with the version it was read at.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub state: TradingState,
    pub version: Version,
}

/// Typed access to the trading state on top of any `Persistence` backend.
pub struct StateStore {
    backend: Box<dyn Persistence>,
    key: String,
}

impl StateStore {
    pub fn new(backend: Box<dyn Persistence>, key: impl Into<String>) -> Self {
        Self { backend, key: key.into() }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Loads the persisted state. On first run, `initial` provides it and the version is `Absent`.
    pub async fn load(&self, initial: impl FnOnce() -> TradingState) -> Result<LoadedState> {
        match self.backend.read(&self.key).await? {
            None => {
                tracing::info!(key = %self.key, backend = self.backend.name(), "No persisted state found, starting fresh.");
                Ok(LoadedState { state: initial(), version: Version::Absent })
            }
            Some((payload, version)) => {
                let state: TradingState = serde_json::from_str(&payload)
                    .map_err(|e| Error::Corrupt(format!("state '{}' does not parse: {e}", self.key)))?;
                state
                    .validate()
                    .map_err(|e| Error::Corrupt(format!("state '{}': {e}", self.key)))?;
                tracing::debug!(key = %self.key, %version, symbols = state.symbols.len(), "Loaded trading state.");
                Ok(LoadedState { state, version })
            }
        }
    }

    /// Persists `state` if nobody else wrote since `expected`. Returns the new version.
    pub async fn save(&self, state: &TradingState, expected: &Version) -> Result<Version> {
        state
            .validate()
            .map_err(|e| Error::Corrupt(format!("refusing to save invalid state: {e}")))?;
        let payload = serde_json::to_string_pretty(state)?;
        let version = self.backend.write(&self.key, &payload, expected).await?;
        tracing::debug!(key = %self.key, from = %expected, to = %version, "Saved trading state.");
        Ok(version)
    }

    /// Serializes and appends a record under `name`.
    pub async fn append_record<T: Serialize>(&self, name: &str, record: &T) -> Result<()> {
        let payload = serde_json::to_string_pretty(record)?;
        self.backend.write_record(name, &payload).await
    }
}

/// Builds the backend selected in the storage settings.
pub async fn connect(settings: &StorageSettings) -> Result<Box<dyn Persistence>> {
    let missing = |section: &str| Error::Unavailable(format!("[storage.{section}] is not configured"));
    let backend: Box<dyn Persistence> = match settings.backend {
        StorageBackend::File => {
            let file = settings.file.as_ref().ok_or_else(|| missing("file"))?;
            Box::new(FileStore::new(&file.dir))
        }
        StorageBackend::Postgres => {
            let pg = settings.postgres.as_ref().ok_or_else(|| missing("postgres"))?;
            Box::new(postgres::connect(pg).await?)
        }
        StorageBackend::Github => {
            let gh = settings.github.as_ref().ok_or_else(|| missing("github"))?;
            Box::new(GithubStore::new(gh)?)
        }
    };
    tracing::info!(backend = backend.name(), "Storage backend ready.");
    Ok(backend)
}
