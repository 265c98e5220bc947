//! Write-visibility cache.
//!
//! The remote file primitive can serve stale bytes for a short window after a
//! write completes. Every write records the content here and every read checks
//! here first, so a read that follows our own write sees what we wrote.
//! Entries expire after a fixed TTL and are evicted lazily on lookup.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use outpost_types::RemotePath;
use tokio::time::Instant;

pub const DEFAULT_WRITE_CACHE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CacheEntry {
    content: String,
    written_at: Instant,
}

#[derive(Debug)]
pub struct WriteCache {
    ttl: Duration,
    entries: Mutex<HashMap<RemotePath, CacheEntry>>,
}

impl Default for WriteCache {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_CACHE_TTL)
    }
}

impl WriteCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `content` as the latest known bytes for `path`, replacing any prior entry.
    pub fn record(&self, path: &RemotePath, content: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            path.clone(),
            CacheEntry {
                content: content.to_string(),
                written_at: Instant::now(),
            },
        );
    }

    /// Content written to `path` within the TTL, if any. Expired entries are removed.
    #[must_use]
    pub fn get(&self, path: &RemotePath) -> Option<String> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries.get(path)?;
        if entry.written_at.elapsed() > self.ttl {
            tracing::trace!(path = %path, "write cache entry expired");
            entries.remove(path);
            return None;
        }
        Some(entry.content.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::WriteCache;
    use outpost_types::RemotePath;
    use std::time::Duration;

    fn path(raw: &str) -> RemotePath {
        RemotePath::new(raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl() {
        let cache = WriteCache::new(Duration::from_secs(10));
        cache.record(&path("/a.txt"), "hello");
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&path("/a.txt")).as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn miss_and_evict_after_ttl() {
        let cache = WriteCache::new(Duration::from_secs(10));
        cache.record(&path("/a.txt"), "hello");
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get(&path("/a.txt")), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_overwrites_and_refreshes_timestamp() {
        let cache = WriteCache::new(Duration::from_secs(10));
        cache.record(&path("/a.txt"), "v1");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.record(&path("/a.txt"), "v2");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&path("/a.txt")).as_deref(), Some("v2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_per_path() {
        let cache = WriteCache::default();
        cache.record(&path("/a.txt"), "a");
        cache.record(&path("/b.txt"), "b");
        assert_eq!(cache.get(&path("/a.txt")).as_deref(), Some("a"));
        assert_eq!(cache.get(&path("/b.txt")).as_deref(), Some("b"));
        assert_eq!(cache.get(&path("/c.txt")), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
