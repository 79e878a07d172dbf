use crate::VersionToken;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    pub content: Value,
    pub version: VersionToken,
}

#[derive(Debug)]
struct CacheEntry {
    document: CachedDocument,
    inserted_at: Instant,
}

/// Logical path -> last read document, valid for a fixed TTL.
///
/// Process-local only; writers in other processes are not observed until
/// the entry expires.
///
/// Every invalidation bumps a generation counter. Readers capture it with
/// [`DocumentCache::generation`] before fetching and fill the cache through
/// [`DocumentCache::set_if_current`], so a fetch that raced with a local
/// write is never stored.
#[derive(Debug)]
pub struct DocumentCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
}

impl DocumentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, path: &str) -> Option<CachedDocument> {
        let entries = self.entries.read().await;
        let entry = entries.get(path)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.document.clone())
    }

    pub async fn set(&self, path: &str, content: Value, version: VersionToken) {
        let entry = CacheEntry {
            document: CachedDocument { content, version },
            inserted_at: Instant::now(),
        };
        self.entries.write().await.insert(path.to_string(), entry);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Inserts the entry only if nothing was invalidated since `generation`
    /// was captured. Returns whether the entry was stored.
    pub async fn set_if_current(
        &self,
        path: &str,
        content: Value,
        version: VersionToken,
        generation: u64,
    ) -> bool {
        let mut entries = self.entries.write().await;
        // Bumps happen under the write lock, so this check cannot interleave
        // with an invalidation.
        if self.generation() != generation {
            return false;
        }
        entries.insert(
            path.to_string(),
            CacheEntry {
                document: CachedDocument { content, version },
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Drops one entry, or everything when `path` is `None`.
    pub async fn invalidate(&self, path: Option<&str>) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        match path {
            Some(path) => {
                entries.remove(path);
            }
            None => entries.clear(),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
