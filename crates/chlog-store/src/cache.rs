use crate::{key_hash, lock_file, write_atomic, LockGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;

/// Key/value cache with per-entry expiry.
///
/// Misses, expired entries and unreadable entries all look the same to
/// callers: `get` returns `None` and the value is fetched again.
pub trait IssueCache {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    expires_at: i64,
    value: Value,
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> i64 {
    now.unix_timestamp()
        .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

// ── Disk ──

/// One JSON file per key under `dir`, written atomically.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim the directory for this run. Held by the owning source until it
    /// is dropped; a second run on the same directory blocks here.
    pub fn lock(&self) -> anyhow::Result<LockGuard> {
        lock_file(&self.dir.join(".lock"))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_hash(key)))
    }

    pub fn get_at(&self, key: &str, now: OffsetDateTime) -> Option<Value> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        let envelope: Envelope = match serde_json::from_slice(&raw) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable cache entry"
                );
                return None;
            }
        };
        if envelope.key != key || envelope.expires_at <= now.unix_timestamp() {
            return None;
        }
        Some(envelope.value)
    }

    pub fn set_at(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let envelope = Envelope {
            key: key.to_string(),
            expires_at: expiry(now, ttl),
            value: value.clone(),
        };
        let data = serde_json::to_vec(&envelope)?;
        write_atomic(&self.entry_path(key), &data)
    }
}

impl IssueCache for DiskCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, OffsetDateTime::now_utc())
    }

    fn set(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()> {
        self.set_at(key, value, ttl, OffsetDateTime::now_utc())
    }
}

// ── Memory ──

/// Process-local cache, used for `--no-cache` runs and tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (i64, Value)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IssueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|(expires_at, _)| *expires_at > now)
            .map(|(_, v)| v.clone())
    }

    fn set(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache poisoned"))?;
        entries.insert(key.to_string(), (expiry(OffsetDateTime::now_utc(), ttl), value.clone()));
        Ok(())
    }
}
