//! File-state observation for cache invalidation.
//!
//! A state is the `(mtime, size, optional content hash)` of a path at
//! observation time. Comparing a recorded state against a fresh one
//! answers "has this file changed since we last looked".

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::store::PersistentStore;
use crate::utils::paths::resolve_or_normalize;

/// Content hashes are only computed for regular files below this size.
pub const HASH_SIZE_THRESHOLD: u64 = 1_000_000;

const STATE_PREFIX: &str = "_filestate:";

/// Immutable snapshot of a path's observable state.
///
/// Directories record `size = 0` and never carry a hash; their mtime
/// changes when entries are added or removed, which is a deliberately
/// weak but cheap signal for invalidating coarse-grained searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub size: u64,
    pub content_hash: Option<String>,
}

impl FileState {
    /// Observe the current state of `path`. With `hash_content`, regular
    /// files under [`HASH_SIZE_THRESHOLD`] also get a SHA-256 content hash.
    pub fn from_path(path: &Path, hash_content: bool) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;

        let mtime = meta
            .modified()
            .with_context(|| format!("No modification time for {}", path.display()))?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let (size, content_hash) = if meta.is_dir() {
            (0, None)
        } else {
            let size = meta.len();
            let hash = if hash_content && meta.is_file() && size < HASH_SIZE_THRESHOLD {
                Some(Self::hash_file(path)?)
            } else {
                None
            };
            (size, hash)
        };

        Ok(Self {
            mtime_secs: mtime.as_secs(),
            mtime_nanos: mtime.subsec_nanos(),
            size,
            content_hash,
        })
    }

    fn hash_file(path: &Path) -> Result<String> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Tracks recorded file states in the persistent store and answers
/// staleness queries against the live filesystem.
pub struct FileStateTracker {
    store: Arc<PersistentStore>,
}

impl FileStateTracker {
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self { store }
    }

    fn state_key(path: &Path) -> String {
        format!("{}{}", STATE_PREFIX, path.display())
    }

    /// Last recorded state for `path`, if any.
    pub async fn get_state(&self, path: &Path) -> Result<Option<FileState>> {
        let resolved = resolve_or_normalize(path);
        self.store.get(&Self::state_key(&resolved)).await
    }

    /// Observe the current state and record it as the new baseline.
    pub async fn update_state(&self, path: &Path) -> Result<FileState> {
        let resolved = resolve_or_normalize(path);
        let state = FileState::from_path(&resolved, true)?;
        self.store
            .set(&Self::state_key(&resolved), &state, None)
            .await?;
        Ok(state)
    }

    /// True when no baseline exists, the path no longer exists, or the
    /// current state differs from the baseline. The hash is recomputed
    /// only when the baseline carried one.
    pub async fn is_stale(&self, path: &Path) -> Result<bool> {
        let resolved = resolve_or_normalize(path);
        let Some(cached) = self
            .store
            .get::<FileState>(&Self::state_key(&resolved))
            .await?
        else {
            return Ok(true);
        };

        match FileState::from_path(&resolved, cached.content_hash.is_some()) {
            Ok(current) => Ok(current != cached),
            // Deleted (or unreadable) = stale
            Err(_) => Ok(true),
        }
    }
}
