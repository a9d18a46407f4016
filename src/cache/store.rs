//! Bounded, access-ordered cache storage plus the vary index.
//!
//! The teacher has no direct counterpart (its plugin cache, `plugin/cache.rs`,
//! is request-scoped, not a shared RFC-9111 store); the `lru` crate choice
//! follows `examples/06chaynes-http-cache`'s own dependency on `lru` for its
//! in-memory cache manager. A single `parking_lot::Mutex` guards the LRU
//! structure, matching the spec's "single mutex... acceptable, critical
//! sections must not perform I/O" guidance; the vary index is a separate
//! `DashMap` since it tolerates staleness (a stale entry just causes an
//! extra miss) and does not need to share the store's lock.

use std::num::NonZeroUsize;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use super::entry::CachedEntry;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded LRU store of cache keys to entries. Any successful `get` counts
/// as an access and moves the entry to the most-recently-used position.
pub struct CacheStore {
    entries: Mutex<LruCache<String, CachedEntry>>,
}

impl CacheStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, entry: CachedEntry) {
        self.entries.lock().put(key, entry);
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Removes every key for which `predicate` returns true. Used for
    /// unsafe-method invalidation, which must not know the full key shape
    /// (simple vs. variant) ahead of time.
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) {
        let mut guard = self.entries.lock();
        let keys: Vec<String> = guard
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            guard.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Maps a resource's simple key to the `Vary` header value its stored
/// variant was keyed under, so a simple-key miss can be retried as a
/// variant-key lookup without scanning the whole store.
#[derive(Default)]
pub struct VaryIndex {
    index: DashMap<String, String>,
}

impl VaryIndex {
    pub fn get(&self, simple_key: &str) -> Option<String> {
        self.index.get(simple_key).map(|v| v.clone())
    }

    pub fn set(&self, simple_key: String, vary_value: String) {
        self.index.insert(simple_key, vary_value);
    }

    pub fn remove(&self, simple_key: &str) {
        self.index.remove(simple_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::directives::CacheDirectives;
    use bytes::Bytes;

    fn sample(cached_at: i64) -> CachedEntry {
        CachedEntry {
            status: 200,
            headers: vec![],
            body: Bytes::from_static(b"x"),
            directives: CacheDirectives::parse("max-age=60"),
            etag: None,
            last_modified: None,
            cached_at,
        }
    }

    #[test]
    fn evicts_least_recently_accessed_over_capacity() {
        let store = CacheStore::new(2);
        store.put("a".into(), sample(1));
        store.put("b".into(), sample(1));
        // touch "a" so "b" becomes least-recently-used
        assert!(store.get("a").is_some());
        store.put("c".into(), sample(1));
        assert!(store.get("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn remove_matching_deletes_only_matched_keys() {
        let store = CacheStore::new(10);
        store.put("GET|h|/a".into(), sample(1));
        store.put("GET|h|/b".into(), sample(1));
        store.remove_matching(|k| k.starts_with("GET|h|/a"));
        assert!(store.get("GET|h|/a").is_none());
        assert!(store.get("GET|h|/b").is_some());
    }

    #[test]
    fn vary_index_round_trips() {
        let index = VaryIndex::default();
        index.set("GET|h|/x".into(), "Accept-Encoding".into());
        assert_eq!(
            index.get("GET|h|/x").as_deref(),
            Some("Accept-Encoding")
        );
        index.remove("GET|h|/x");
        assert!(index.get("GET|h|/x").is_none());
    }
}
