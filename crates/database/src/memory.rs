// In crates/database/src/memory.rs

//! An in-process backend with the same compare-and-swap semantics as the durable ones.
//!
//! Clones share storage, so a test can keep a handle while the engine owns the boxed backend,
//! then inject concurrent writers or outages through it.

use crate::{Error, Persistence, Result, Version};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, (String, u64)>,
    records: Vec<(String, String)>,
    writes: usize,
    unavailable: bool,
    records_unavailable: bool,
    /// When `writes` reaches this count, another writer bumps the version first.
    interfere_at_write: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates another process saving the same payload under `key`.
    pub fn bump_version(&self, key: &str) {
        let mut inner = self.inner();
        let entry = inner.entries.entry(key.to_string()).or_insert_with(|| ("{}".to_string(), 0));
        entry.1 += 1;
    }

    /// Another writer sneaks in right before the `n`-th write attempt (1-based, counted from now).
    pub fn interfere_before_write(&self, n: usize) {
        let mut inner = self.inner();
        inner.interfere_at_write = Some(inner.writes + n);
    }

    /// Makes every state read and write fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner().unavailable = unavailable;
    }

    /// Makes record writes fail while state access keeps working.
    pub fn set_records_unavailable(&self, unavailable: bool) {
        self.inner().records_unavailable = unavailable;
    }

    pub fn payload(&self, key: &str) -> Option<String> {
        self.inner().entries.get(key).map(|(payload, _)| payload.clone())
    }

    pub fn version(&self, key: &str) -> Version {
        match self.inner().entries.get(key) {
            Some((_, v)) => Version::Tag(v.to_string()),
            None => Version::Absent,
        }
    }

    /// Every record written so far, as `(name, payload)`.
    pub fn records(&self) -> Vec<(String, String)> {
        self.inner().records.clone()
    }

    /// Number of state write attempts, successful or not.
    pub fn write_count(&self) -> usize {
        self.inner().writes
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<(String, Version)>> {
        let inner = self.inner();
        if inner.unavailable {
            return Err(Error::Unavailable("memory store is offline".into()));
        }
        Ok(inner
            .entries
            .get(key)
            .map(|(payload, v)| (payload.clone(), Version::Tag(v.to_string()))))
    }

    async fn write(&self, key: &str, payload: &str, expected: &Version) -> Result<Version> {
        let mut inner = self.inner();
        if inner.unavailable {
            return Err(Error::Unavailable("memory store is offline".into()));
        }
        inner.writes += 1;
        if inner.interfere_at_write == Some(inner.writes) {
            let entry = inner.entries.entry(key.to_string()).or_insert_with(|| ("{}".to_string(), 0));
            entry.1 += 1;
        }

        let current = inner.entries.get(key).map(|(_, v)| *v);
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
        inner.entries.insert(key.to_string(), (payload.to_string(), next));
        Ok(Version::Tag(next.to_string()))
    }

    async fn write_record(&self, name: &str, payload: &str) -> Result<()> {
        let mut inner = self.inner();
        if inner.unavailable || inner.records_unavailable {
            return Err(Error::Unavailable("record sink is offline".into()));
        }
        if inner.records.iter().any(|(existing, _)| existing == name) {
            return Err(Error::Unavailable(format!("record {name} already exists")));
        }
        inner.records.push((name.to_string(), payload.to_string()));
        Ok(())
    }
}
