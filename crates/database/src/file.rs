// In crates/database/src/file.rs

//! JSON files on local disk.
//!
//! Layout under the configured directory:
//! - `{key}.json`: envelope holding a numeric version and the state payload
//! - `{key}.lock`: exists only while a writer is inside its compare-and-swap
//! - `records/{YYYY-MM-DD}/{name}.json`: append-only cycle records
//!
//! Writes go to a temp file that is renamed over the target, so readers never see a torn file.

use crate::{Error, Persistence, Result, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;

/// A lock older than this is assumed to belong to a crashed writer.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(120);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);
const LOCK_ATTEMPTS: u32 = 40;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u64,
    saved_at: DateTime<Utc>,
    state: Value,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

/// Removes the lock file when the write finishes, whichever way it finishes.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove lock file.");
        }
    }
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir
            .join("records")
            .join(Utc::now().format("%Y-%m-%d").to_string())
            .join(format!("{name}.json"))
    }

    async fn read_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        match tokio::fs::read_to_string(self.state_path(key)).await {
            Ok(text) => {
                let envelope = serde_json::from_str(&text)
                    .map_err(|e| Error::Corrupt(format!("state file for '{key}': {e}")))?;
                Ok(Some(envelope))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn acquire_lock(&self, key: &str) -> Result<LockGuard> {
        let path = self.dir.join(format!("{key}.lock"));
        for _ in 0..LOCK_ATTEMPTS {
            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(format!("{}", std::process::id()).as_bytes()).await?;
                    return Ok(LockGuard { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path).await {
                        tracing::warn!(path = %path.display(), "Removing stale lock file.");
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Unavailable(format!("could not acquire {}", path.display())))
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AFTER)
}

#[async_trait]
impl Persistence for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, key: &str) -> Result<Option<(String, Version)>> {
        Ok(self.read_envelope(key).await?.map(|envelope| {
            (envelope.state.to_string(), Version::Tag(envelope.version.to_string()))
        }))
    }

    async fn write(&self, key: &str, payload: &str, expected: &Version) -> Result<Version> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let state: Value = serde_json::from_str(payload)?;
        let _lock = self.acquire_lock(key).await?;

        let current = self.read_envelope(key).await?.map(|e| e.version);
        let matches = match (expected, current) {
            (Version::Absent, None) => true,
            (Version::Tag(tag), Some(v)) => tag == &v.to_string(),
            _ => false,
        };
        if !matches {
            return Err(Error::ConcurrentModification {
                key: key.to_string(),
                expected: expected.to_string(),
                actual: current.map_or_else(|| Version::Absent.to_string(), |v| v.to_string()),
            });
        }

        let next = current.unwrap_or(0) + 1;
        let envelope = Envelope { version: next, saved_at: Utc::now(), state };
        let target = self.state_path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(serde_json::to_string_pretty(&envelope)?.as_bytes()).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &target).await?;
        Ok(Version::Tag(next.to_string()))
    }

    async fn write_record(&self, name: &str, payload: &str) -> Result<()> {
        let path = self.record_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.sync_all().await?;
        tracing::debug!(path = %path.display(), "Wrote cycle record.");
        Ok(())
    }
}
