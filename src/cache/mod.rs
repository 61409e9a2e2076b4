//! Process-local detail-page cache
//!
//! A capacity-bounded, time-expiring cache holding raw scraped page bytes.
//! Several operations parse the same detail page within one sync pass
//! (detail, chapter list, chapter content all start from it); this cache
//! amortizes those downloads. There is no persistence and no invalidation
//! beyond TTL expiry.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    data: Bytes,
    stored_at: Instant,
}

/// Bounded LRU cache with a fixed per-entry TTL
pub struct DetailCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl DetailCache {
    /// Create a cache with the given capacity and TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Get a cached page, or None on miss or expiry
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.data.clone()),
            Some(_) => {
                // Expired; drop it so the slot frees up immediately
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Store a page, evicting the least-recently-used entry if full
    pub fn put(&self, key: impl Into<String>, data: Bytes) {
        let mut entries = self.entries.lock().unwrap();
        entries.put(
            key.into(),
            Entry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of live entries (expired ones may still be counted)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for a source's detail page
pub fn detail_key(source_id: i64) -> String {
    format!("detail-{source_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let cache = DetailCache::new(10, Duration::from_secs(60));
        cache.put("detail-1", Bytes::from_static(b"page"));

        assert_eq!(cache.get("detail-1"), Some(Bytes::from_static(b"page")));
        assert_eq!(cache.get("detail-2"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = DetailCache::new(10, Duration::from_millis(10));
        cache.put("detail-1", Bytes::from_static(b"page"));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("detail-1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = DetailCache::new(2, Duration::from_secs(60));
        cache.put("a", Bytes::from_static(b"1"));
        cache.put("b", Bytes::from_static(b"2"));
        cache.put("c", Bytes::from_static(b"3"));

        // "a" was least recently used
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_detail_key() {
        assert_eq!(detail_key(42), "detail-42");
    }
}
