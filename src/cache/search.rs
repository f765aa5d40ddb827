//! Search-result cache with scope-aware invalidation.

use anyhow::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::file_state::FileStateTracker;
use crate::store::PersistentStore;
use crate::utils::paths::resolve_or_normalize;

const SEARCH_PREFIX: &str = "_search:";

/// Produce a canonical JSON string with object keys sorted recursively.
/// This ensures cache keys are stable regardless of key insertion order.
pub(crate) fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            serde_json::to_string(&sorted).unwrap_or_default()
        }
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

/// Caches raw search output keyed by `(operation, pattern, scope, options)`.
///
/// Entries are served only while the scope's recorded file-state still
/// matches the filesystem **and** the entry is within its TTL. The dual
/// gate exists because a directory's mtime does not reliably change when
/// a file beneath it is edited in place; the TTL is the eventual-
/// consistency ceiling for that blind spot.
pub struct SearchCache {
    store: Arc<PersistentStore>,
    tracker: Arc<FileStateTracker>,
    /// Default TTL in seconds for search entries.
    default_ttl: u64,
}

impl SearchCache {
    pub fn new(
        store: Arc<PersistentStore>,
        tracker: Arc<FileStateTracker>,
        default_ttl: u64,
    ) -> Self {
        Self {
            store,
            tracker,
            default_ttl,
        }
    }

    fn cache_key(operation: &str, pattern: &str, scope: &Path, options: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0]);
        hasher.update(pattern.as_bytes());
        hasher.update([0]);
        hasher.update(scope.display().to_string().as_bytes());
        hasher.update([0]);
        hasher.update(canonical_json(options).as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}{}", SEARCH_PREFIX, &digest[..16])
    }

    /// Cached output for this search, or `None` when absent, expired, or
    /// the scope has changed since the result was stored.
    pub async fn get_search_result(
        &self,
        operation: &str,
        pattern: &str,
        scope: &Path,
        options: &Value,
    ) -> Result<Option<String>> {
        let scope_resolved = resolve_or_normalize(scope);

        if self.tracker.is_stale(&scope_resolved).await? {
            debug!(
                "search cache stale scope: {} ({})",
                scope_resolved.display(),
                operation
            );
            return Ok(None);
        }

        let key = Self::cache_key(operation, pattern, &scope_resolved, options);
        let hit = self.store.get::<String>(&key).await?;
        if hit.is_some() {
            debug!("search cache hit: {} '{}'", operation, pattern);
        }
        Ok(hit)
    }

    /// Store a search result and record the scope's current state as the
    /// freshness baseline.
    pub async fn set_search_result(
        &self,
        operation: &str,
        pattern: &str,
        scope: &Path,
        options: &Value,
        result: &str,
        ttl: Option<u64>,
    ) -> Result<()> {
        let scope_resolved = resolve_or_normalize(scope);
        let key = Self::cache_key(operation, pattern, &scope_resolved, options);

        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        let expire = (effective_ttl > 0).then(|| Duration::from_secs(effective_ttl));

        self.store.set(&key, &result.to_string(), expire).await?;
        self.tracker.update_state(&scope_resolved).await?;
        Ok(())
    }

    /// Remove one specific cached search. Returns true if it existed.
    pub async fn invalidate_pattern(
        &self,
        operation: &str,
        pattern: &str,
        scope: &Path,
        options: &Value,
    ) -> bool {
        let scope_resolved = resolve_or_normalize(scope);
        let key = Self::cache_key(operation, pattern, &scope_resolved, options);
        self.store.delete(&key).await
    }
}
