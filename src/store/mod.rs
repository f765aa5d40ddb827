//! Disk-backed key-value store with LRU eviction and per-entry TTL.
//!
//! Entries are hash-sharded JSON records under one directory, written
//! atomically. An in-memory recency index provides LRU ordering; every
//! operation serializes through a single async lock, which makes the
//! store safe for any number of concurrent callers. The on-disk format
//! is an implementation detail, not a wire format.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::utils::{atomic_write, ensure_dir};

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
struct Record {
    key: String,
    value: Value,
    expires_at: Option<DateTime<Utc>>,
    stored_at: DateTime<Utc>,
}

struct IndexEntry {
    file: PathBuf,
    bytes: u64,
    expires_at: Option<DateTime<Utc>>,
}

struct Inner {
    index: LruCache<String, IndexEntry>,
    total_bytes: u64,
}

/// Aggregate store metrics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub entry_count: usize,
    pub byte_volume: u64,
    pub directory: PathBuf,
}

pub struct PersistentStore {
    directory: PathBuf,
    size_limit: u64,
    inner: Mutex<Inner>,
}

impl PersistentStore {
    /// Open (or create) a store rooted at `directory`.
    ///
    /// Existing records are rescanned to rebuild the recency index;
    /// recency order across restarts is approximated by file mtime.
    pub fn open(directory: impl Into<PathBuf>, size_limit: u64) -> Result<Self> {
        let directory = ensure_dir(directory.into())?;

        let mut found: Vec<(String, IndexEntry, std::time::SystemTime)> = Vec::new();
        for shard in std::fs::read_dir(&directory)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(shard.path())? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let meta = entry.metadata()?;
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                match serde_json::from_str::<Record>(&text) {
                    Ok(record) => {
                        let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
                        found.push((
                            record.key,
                            IndexEntry {
                                file: path,
                                bytes: meta.len(),
                                expires_at: record.expires_at,
                            },
                            modified,
                        ));
                    }
                    Err(e) => {
                        warn!("store: discarding unreadable record {}: {}", path.display(), e);
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }

        // Oldest files first so they sit at the LRU end of the index.
        found.sort_by_key(|(_, _, modified)| *modified);

        let mut index = LruCache::unbounded();
        let mut total_bytes = 0u64;
        for (key, entry, _) in found {
            total_bytes += entry.bytes;
            index.put(key, entry);
        }

        debug!(
            "store: opened {} with {} entries, {} bytes",
            directory.display(),
            index.len(),
            total_bytes
        );

        Ok(Self {
            directory,
            size_limit,
            inner: Mutex::new(Inner { index, total_bytes }),
        })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        let digest = &digest[..16];
        self.directory.join(&digest[..2]).join(format!("{}.json", digest))
    }

    /// Retrieve a value. Expired entries are treated as absent and
    /// removed lazily. A hit refreshes the entry's LRU recency.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut inner = self.inner.lock().await;

        let (file, expires_at) = match inner.index.get(key) {
            Some(entry) => (entry.file.clone(), entry.expires_at),
            None => return Ok(None),
        };

        if expires_at.is_some_and(|at| at <= Utc::now()) {
            debug!("store: expired entry for key {}", key);
            Self::remove_entry(&mut inner, key);
            return Ok(None);
        }
        let text = match std::fs::read_to_string(&file) {
            Ok(text) => text,
            Err(_) => {
                // Record vanished out from under the index.
                Self::remove_entry(&mut inner, key);
                return Ok(None);
            }
        };

        let record: Record = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse store record {}", file.display()))?;
        if record.key != key {
            // Digest collision; the stored record belongs to another key.
            warn!("store: digest collision between '{}' and '{}'", record.key, key);
            return Ok(None);
        }

        let value = serde_json::from_value(record.value)
            .with_context(|| format!("Stored value for '{}' has unexpected shape", key))?;
        Ok(Some(value))
    }

    /// Store a value with an optional relative TTL. Writing may evict
    /// least-recently-used entries to stay under the volume ceiling.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expire: Option<Duration>,
    ) -> Result<()> {
        let expires_at = match expire {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl).context("TTL out of range")?,
            ),
            None => None,
        };

        let record = Record {
            key: key.to_string(),
            value: serde_json::to_value(value)?,
            expires_at,
            stored_at: Utc::now(),
        };
        let text = serde_json::to_string(&record)?;
        let file = self.record_path(key);

        let mut inner = self.inner.lock().await;
        atomic_write(&file, &text)?;

        if let Some(old) = inner.index.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.bytes);
        }
        let bytes = text.len() as u64;
        inner.total_bytes += bytes;
        inner.index.put(
            key.to_string(),
            IndexEntry {
                file,
                bytes,
                expires_at,
            },
        );

        self.evict_over_limit(&mut inner);
        Ok(())
    }

    /// Remove a key. Returns true if it was present.
    pub async fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.index.contains(key) {
            Self::remove_entry(&mut inner, key);
            true
        } else {
            false
        }
    }

    /// Remove everything.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let files: Vec<PathBuf> = inner.index.iter().map(|(_, e)| e.file.clone()).collect();
        for file in files {
            let _ = std::fs::remove_file(&file);
        }
        inner.index.clear();
        inner.total_bytes = 0;
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().await;
        StoreStats {
            entry_count: inner.index.len(),
            byte_volume: inner.total_bytes,
            directory: self.directory.clone(),
        }
    }

    /// Snapshot of all current keys. Walks the whole index; intended
    /// only for bulk invalidation paths.
    pub async fn iter_keys(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.index.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn remove_entry(inner: &mut Inner, key: &str) {
        if let Some(entry) = inner.index.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
            let _ = std::fs::remove_file(&entry.file);
        }
    }

    fn evict_over_limit(&self, inner: &mut Inner) {
        while inner.total_bytes > self.size_limit && inner.index.len() > 1 {
            if let Some((key, entry)) = inner.index.pop_lru() {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
                let _ = std::fs::remove_file(&entry.file);
                debug!("store: evicted {} ({} bytes)", key, entry.bytes);
            } else {
                break;
            }
        }
    }
}
