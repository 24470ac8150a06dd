//! TTL key/value store backing the tool-result cache and the offline queue.
//!
//! Every record carries an absolute expiry computed at write time. Reads
//! evict lazily; a background sweep bounds growth for keys nobody reads
//! again. Persistence is an optional JSON snapshot: a write failure is
//! logged and never propagates to the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key namespace for cached tool results.
const TOOL_CACHE_PREFIX: &str = "tool_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared TTL store. Cheap to clone behind an [`Arc`].
#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    storage_path: Option<PathBuf>,
}

impl CacheStore {
    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            storage_path: None,
        }
    }

    /// Store snapshotting to `path` on every mutation. Loads the existing
    /// snapshot, dropping records that expired while the process was down.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut entries = HashMap::new();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
                    Ok(loaded) => {
                        let now = Utc::now();
                        let total = loaded.len();
                        entries = loaded
                            .into_iter()
                            .filter(|(_, e)| !e.is_expired(now))
                            .collect();
                        tracing::info!(
                            "Loaded cache snapshot from {} ({} live of {} records)",
                            path.display(),
                            entries.len(),
                            total
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Cache snapshot at {} is unreadable ({}), starting empty",
                            path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!("Could not read cache snapshot {}: {}", path.display(), e);
                }
            }
        }
        Self {
            entries: RwLock::new(entries),
            storage_path: Some(path),
        }
    }

    /// Upsert a record expiring `ttl_minutes` from now. A zero or negative
    /// TTL writes an already-expired record (useful in tests).
    pub async fn set(&self, key: &str, value: Value, ttl_minutes: i64) {
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            expires_at: now + Duration::minutes(ttl_minutes),
            created_at: now,
        };
        {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), entry);
        }
        self.persist().await;
    }

    /// Fetch a live record. Absent and expired keys both come back `None`;
    /// an expired record is deleted as a side effect of the read.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                drop(entries);
                self.persist().await;
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Remove a record. Returns whether one existed.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(key).is_some()
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Drop every expired record. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        };
        if removed > 0 {
            tracing::debug!("Cache sweep removed {} expired records", removed);
            self.persist().await;
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn persist(&self) {
        let Some(path) = &self.storage_path else {
            return;
        };
        let snapshot = {
            let entries = self.entries.read().await;
            match serde_json::to_string(&*entries) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Could not serialize cache snapshot: {}", e);
                    return;
                }
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create cache directory: {}", e);
                return;
            }
        }
        if let Err(e) = std::fs::write(path, snapshot) {
            tracing::warn!("Could not write cache snapshot {}: {}", path.display(), e);
        }
    }
}

/// Run [`CacheStore::purge_expired`] every `every` until the store is
/// dropped by the embedder (the task holds its own Arc).
pub fn spawn_sweeper(
    store: Arc<CacheStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately; skip it so the sweep starts
        // one full period after spawn.
        interval.tick().await;
        loop {
            interval.tick().await;
            store.purge_expired().await;
        }
    })
}

/// Cache key for a tool invocation.
///
/// serde_json maps are key-ordered (the preserve_order feature is off), so
/// serializing the parameters yields one canonical text per logical map
/// regardless of the order the planner emitted the keys in.
pub fn tool_cache_key(tool: &str, parameters: &Value) -> String {
    let canonical = serde_json::to_string(parameters).unwrap_or_else(|_| "null".to_string());
    format!("{}:{}:{}", TOOL_CACHE_PREFIX, tool, canonical)
}
