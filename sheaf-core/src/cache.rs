//! Content-addressed transform cache
//!
//! Entries are keyed by the transform chain identity plus the hash of the
//! input bytes. Each key is computed at most once: concurrent requesters of
//! the same key block on the first computation instead of duplicating it.

use crate::hash::content_hash;
use crate::pipeline::{ChainOutput, TransformChain};
use crate::transform::{Artifact, ArtifactKind};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// `TransformChain::identity()`
    pub chain: String,
    pub input_kind: ArtifactKind,
    pub content_hash: String,
}

impl CacheKey {
    pub fn new(chain: &TransformChain, input: &Artifact) -> Self {
        Self {
            chain: chain.identity(),
            input_kind: input.kind,
            content_hash: content_hash(&input.content),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type Slot = Arc<OnceCell<Arc<ChainOutput>>>;

/// Shared transform cache handle
///
/// Pass the same `Arc<TransformCache>` to several builds to reuse outputs
/// across them.
#[derive(Default)]
pub struct TransformCache {
    entries: DashMap<CacheKey, Slot>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for TransformCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformCache")
            .field("entries", &self.entries.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached output for `key`, computing it with `compute` on a miss
    ///
    /// The boolean is `true` on a cache hit. A failed computation leaves the
    /// slot empty so a later request can retry.
    pub fn get_or_try_insert_with<E, F>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<(Arc<ChainOutput>, bool), E>
    where
        F: FnOnce() -> Result<ChainOutput, E>,
    {
        // Clone the slot out so the shard lock is not held while computing.
        let slot: Slot = self.entries.entry(key).or_default().clone();

        let mut computed = false;
        let output = slot.get_or_try_init(|| {
            computed = true;
            compute().map(Arc::new)
        })?;

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok((Arc::clone(output), !computed))
    }

    /// Cached output for `key`, if it has been computed
    pub fn get(&self, key: &CacheKey) -> Option<Arc<ChainOutput>> {
        self.entries
            .get(key)
            .and_then(|slot| slot.get().map(Arc::clone))
    }

    /// Number of computed entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
