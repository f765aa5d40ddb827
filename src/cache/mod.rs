//! Multi-tier cache: persistent store → file-state tracker → content and
//! search caches. References point strictly downward; nothing in this
//! module calls back up the stack.

pub mod content;
pub mod file_state;
pub mod search;

pub use content::ContentCache;
pub use file_state::{FileState, FileStateTracker, HASH_SIZE_THRESHOLD};
pub use search::SearchCache;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::config::CacheConfig;
use crate::errors::{BurrowError, BurrowResult};
use crate::store::{PersistentStore, StoreStats};

/// Aggregated cache metrics for monitoring surfaces.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub store: StoreStats,
    pub content_ttl_seconds: u64,
    pub search_ttl_seconds: u64,
}

/// Owns the whole cache stack and hands out its layers.
pub struct CacheManager {
    store: Arc<PersistentStore>,
    tracker: Arc<FileStateTracker>,
    content: ContentCache,
    search: SearchCache,
    content_ttl: u64,
    search_ttl: u64,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> BurrowResult<Self> {
        info!(
            "initializing cache: dir={}, size_limit={}, content_ttl={}, search_ttl={}",
            config.cache_dir.display(),
            config.size_limit_bytes,
            config.content_ttl_seconds,
            config.search_ttl_seconds
        );

        let store = Arc::new(
            PersistentStore::open(&config.cache_dir, config.size_limit_bytes)
                .context("Failed to open persistent cache store")
                .map_err(|e| BurrowError::Cache(e.to_string()))?,
        );
        let tracker = Arc::new(FileStateTracker::new(store.clone()));

        Ok(Self {
            content: ContentCache::new(store.clone(), tracker.clone(), config.content_ttl_seconds),
            search: SearchCache::new(store.clone(), tracker.clone(), config.search_ttl_seconds),
            store,
            tracker,
            content_ttl: config.content_ttl_seconds,
            search_ttl: config.search_ttl_seconds,
        })
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<FileStateTracker> {
        &self.tracker
    }

    pub fn content(&self) -> &ContentCache {
        &self.content
    }

    pub fn search(&self) -> &SearchCache {
        &self.search
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            store: self.store.stats().await,
            content_ttl_seconds: self.content_ttl,
            search_ttl_seconds: self.search_ttl,
        }
    }

    /// Remove all cached data: content, search results, and file-state
    /// baselines. Irreversible; the next access repopulates from disk.
    pub async fn clear_all(&self) {
        self.store.clear().await;
    }
}
