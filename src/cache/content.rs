//! Full-content cache gated by file-state staleness.

use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::file_state::FileStateTracker;
use crate::store::PersistentStore;
use crate::utils::paths::resolve_or_normalize;

const CONTENT_PREFIX: &str = "_content:";

/// Caches full file contents keyed by resolved path.
///
/// Coupling the content write and the tracker update in one call keeps
/// the invariant that a cache entry always has a committed baseline to
/// compare against. There is no reader-side lock: concurrent misses may
/// both load, and the last idempotent write wins; loaders are pure
/// reads from the filesystem.
pub struct ContentCache {
    store: Arc<PersistentStore>,
    tracker: Arc<FileStateTracker>,
    /// Default TTL in seconds; 0 means no time-based expiry (file-state
    /// invalidation only).
    default_ttl: u64,
}

impl ContentCache {
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

    fn content_key(path: &Path) -> String {
        format!("{}{}", CONTENT_PREFIX, path.display())
    }

    /// Get full file content, loading if not cached or stale.
    ///
    /// The loader receives the caller's (unresolved) path and must return
    /// the complete current content; head/tail style slicing belongs to
    /// layers above. Loader errors propagate without touching the cache
    /// or the tracker.
    pub async fn get_content<L, Fut>(
        &self,
        path: &Path,
        loader: L,
        ttl: Option<u64>,
    ) -> Result<String>
    where
        L: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let resolved = resolve_or_normalize(path);
        let key = Self::content_key(&resolved);

        if !self.tracker.is_stale(&resolved).await? {
            if let Some(cached) = self.store.get::<String>(&key).await? {
                debug!("content cache hit: {}", resolved.display());
                return Ok(cached);
            }
        }

        debug!("content cache miss/stale: {}", resolved.display());
        let content = loader(path.to_path_buf()).await?;

        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        let expire = (effective_ttl > 0).then(|| Duration::from_secs(effective_ttl));

        self.store.set(&key, &content, expire).await?;
        self.tracker.update_state(&resolved).await?;

        Ok(content)
    }

    /// Drop the cached content for one file. The tracker baseline is left
    /// in place; the next `get_content` refreshes it.
    pub async fn invalidate(&self, path: &Path) {
        let resolved = resolve_or_normalize(path);
        self.store.delete(&Self::content_key(&resolved)).await;
        debug!("content cache invalidated: {}", resolved.display());
    }

    /// Drop all cached files inside `directory`, using path-segment
    /// containment: `/data` matches `/data/file.txt` but never `/data2`
    /// or `/database`. Walks every key; bulk paths only.
    pub async fn invalidate_directory(&self, directory: &Path) -> usize {
        let dir_resolved = resolve_or_normalize(directory);
        let mut count = 0;

        for key in self.store.iter_keys().await {
            let Some(path_str) = key.strip_prefix(CONTENT_PREFIX) else {
                continue;
            };
            if Path::new(path_str).starts_with(&dir_resolved) && self.store.delete(&key).await {
                count += 1;
            }
        }

        debug!(
            "content cache invalidated directory {} ({} entries)",
            dir_resolved.display(),
            count
        );
        count
    }
}
