//! RFC-9111-style shared-cache policy: cacheability, key construction,
//! lookup, freshness, revalidation merge, and unsafe-method invalidation.
//!
//! No teacher module implements shared-cache semantics (`plugin/cache.rs`
//! is a simple request/response passthrough cache keyed by full URI with no
//! `Vary` or revalidation handling); this is built fresh against spec.md
//! §4.4, borrowing only directive vocabulary from the `06chaynes-http-cache`
//! / `aleasims-http-cache` family as noted in `DESIGN.md`.

use bytes::Bytes;

use super::directives::CacheDirectives;
use super::entry::CachedEntry;
use super::key::{simple_key, variant_key, vary_fingerprint, vary_names};
use super::store::{CacheStore, VaryIndex};

/// The pieces of a backend response the cache needs to decide
/// cacheability and build an entry. Headers are expected to already be
/// hop-by-hop-filtered by the caller (`HeaderRewriter`) before this is
/// called, per the open-question decision that filtering happens on
/// insert, never on serve.
pub struct InsertCandidate<'a> {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub cache_control: Option<&'a str>,
    pub vary: Option<&'a str>,
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

pub struct CacheService {
    store: CacheStore,
    vary_index: VaryIndex,
}

impl CacheService {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: CacheStore::new(capacity),
            vary_index: VaryIndex::default(),
        }
    }

    /// Looks up a cached entry for a safe request. Returns the storage key
    /// actually hit (needed later to apply a revalidation update) along
    /// with the entry. Re-checks cacheability on hit; a stale-cacheability
    /// entry is evicted and treated as a miss.
    pub fn lookup(
        &self,
        method: &str,
        host: &str,
        path_with_query: &str,
        header_lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<(String, CachedEntry)> {
        let simple = simple_key(method, host, path_with_query);
        if let Some(entry) = self.store.get(&simple) {
            return self.recheck_or_evict(simple, entry);
        }

        let vary_value = self.vary_index.get(&simple)?;
        let names = vary_names(&vary_value);
        let fingerprint = vary_fingerprint(names.iter().map(String::as_str), header_lookup);
        let variant = variant_key(method, host, path_with_query, &fingerprint);
        if let Some(entry) = self.store.get(&variant) {
            return self.recheck_or_evict(variant, entry);
        }
        self.vary_index.remove(&simple);
        None
    }

    fn recheck_or_evict(&self, key: String, entry: CachedEntry) -> Option<(String, CachedEntry)> {
        if entry.directives.cacheable_for_insert() {
            Some((key, entry))
        } else {
            self.store.remove(&key);
            None
        }
    }

    /// Offers a backend response to the cache for a safe request.
    pub fn insert(
        &self,
        method: &str,
        host: &str,
        path_with_query: &str,
        now: i64,
        header_lookup: impl Fn(&str) -> Option<String>,
        candidate: InsertCandidate<'_>,
    ) {
        let simple = simple_key(method, host, path_with_query);

        let vary_is_star = candidate
            .vary
            .map(|v| v.trim() == "*")
            .unwrap_or(false);
        if vary_is_star {
            self.purge_resource(host, path_with_query);
            return;
        }

        if candidate.status != 200 {
            return;
        }
        let directives = CacheDirectives::parse(candidate.cache_control.unwrap_or(""));
        if !directives.cacheable_for_insert() {
            return;
        }

        let entry = CachedEntry {
            status: candidate.status,
            headers: candidate.headers,
            body: candidate.body,
            directives,
            etag: candidate.etag.map(str::to_string),
            last_modified: candidate.last_modified.map(str::to_string),
            cached_at: now,
        };

        match candidate.vary.filter(|v| !v.trim().is_empty()) {
            None => {
                self.store.put(simple.clone(), entry);
                self.vary_index.remove(&simple);
            }
            Some(vary_value) => {
                let names = vary_names(vary_value);
                let fingerprint =
                    vary_fingerprint(names.iter().map(String::as_str), header_lookup);
                let variant = variant_key(method, host, path_with_query, &fingerprint);
                self.store.put(variant, entry);
                self.vary_index.set(simple, vary_value.to_string());
            }
        }
    }

    /// Applies a 304 revalidation update to the entry stored under `key`:
    /// refreshes `cached_at`, overwrites the ETag if the 304 carried one,
    /// and overlays any directives the 304's `Cache-Control` named.
    pub fn apply_revalidation(
        &self,
        key: &str,
        now: i64,
        cache_control: Option<&str>,
        etag: Option<&str>,
    ) -> Option<CachedEntry> {
        let mut entry = self.store.get(key)?;
        entry.cached_at = now;
        if let Some(etag) = etag {
            entry.etag = Some(etag.to_string());
        }
        if let Some(cc) = cache_control {
            entry.directives.overlay(cc);
        }
        self.store.put(key.to_string(), entry.clone());
        Some(entry)
    }

    /// Purges every cached entry for `(host, path_with_query)` whose
    /// method is `GET` or `HEAD`, and the corresponding vary-index
    /// entries. Used both for unsafe-method invalidation and for a
    /// `Vary: *` response on insert.
    pub fn purge_resource(&self, host: &str, path_with_query: &str) {
        let get_simple = simple_key("GET", host, path_with_query);
        let head_simple = simple_key("HEAD", host, path_with_query);
        let get_variant_prefix = format!("{get_simple}|");
        let head_variant_prefix = format!("{head_simple}|");
        self.store.remove_matching(|k| {
            k == get_simple
                || k == head_simple
                || k.starts_with(&get_variant_prefix)
                || k.starts_with(&head_variant_prefix)
        });
        self.vary_index.remove(&get_simple);
        self.vary_index.remove(&head_simple);
    }

    /// Invalidates on an unsafe request. Identical to `purge_resource`;
    /// named separately to mirror the spec's §4.4.6 vocabulary at call
    /// sites.
    pub fn invalidate_unsafe(&self, host: &str, path_with_query: &str) {
        self.purge_resource(host, path_with_query);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(status: u16, cache_control: Option<&str>, vary: Option<&str>) -> InsertCandidate<'_> {
        InsertCandidate {
            status,
            headers: vec![],
            body: Bytes::from_static(b"{\"data\":\"cached\"}"),
            cache_control,
            vary,
            etag: Some("abc123"),
            last_modified: None,
        }
    }

    #[test]
    fn insert_then_lookup_hits() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/api/cached",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        let hit = cache.lookup("GET", "a.example.com", "/api/cached", |_| None);
        assert!(hit.is_some());
    }

    #[test]
    fn no_store_never_inserted() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/x",
            1000,
            |_| None,
            candidate(200, Some("no-store, max-age=60"), None),
        );
        assert!(cache
            .lookup("GET", "a.example.com", "/x", |_| None)
            .is_none());
    }

    #[test]
    fn vary_star_purges_and_prevents_insert() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/x",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        assert!(cache
            .lookup("GET", "a.example.com", "/x", |_| None)
            .is_some());
        cache.insert(
            "GET",
            "a.example.com",
            "/x",
            1001,
            |_| None,
            candidate(200, Some("max-age=60"), Some("*")),
        );
        assert!(cache
            .lookup("GET", "a.example.com", "/x", |_| None)
            .is_none());
    }

    #[test]
    fn vary_variant_lookup_uses_request_headers() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/x",
            1000,
            |name| {
                if name == "accept-encoding" {
                    Some("gzip".to_string())
                } else {
                    None
                }
            },
            candidate(200, Some("max-age=60"), Some("Accept-Encoding")),
        );
        let hit_gzip = cache.lookup("GET", "a.example.com", "/x", |name| {
            if name == "accept-encoding" {
                Some("gzip".to_string())
            } else {
                None
            }
        });
        assert!(hit_gzip.is_some());
        let hit_br = cache.lookup("GET", "a.example.com", "/x", |name| {
            if name == "accept-encoding" {
                Some("br".to_string())
            } else {
                None
            }
        });
        assert!(hit_br.is_none());
    }

    #[test]
    fn unsafe_invalidation_removes_get_and_head_not_other_paths() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/r",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        cache.insert(
            "GET",
            "a.example.com",
            "/other",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        cache.invalidate_unsafe("a.example.com", "/r");
        assert!(cache
            .lookup("GET", "a.example.com", "/r", |_| None)
            .is_none());
        assert!(cache
            .lookup("GET", "a.example.com", "/other", |_| None)
            .is_some());
    }

    #[test]
    fn unsafe_invalidation_does_not_match_textually_prefixed_sibling_paths() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/r",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        cache.insert(
            "GET",
            "a.example.com",
            "/report",
            1000,
            |_| None,
            candidate(200, Some("max-age=60"), None),
        );
        cache.invalidate_unsafe("a.example.com", "/r");
        assert!(cache
            .lookup("GET", "a.example.com", "/r", |_| None)
            .is_none());
        assert!(cache
            .lookup("GET", "a.example.com", "/report", |_| None)
            .is_some());
    }

    #[test]
    fn apply_revalidation_refreshes_cached_at_and_overlays_directives() {
        let cache = CacheService::new(100);
        cache.insert(
            "GET",
            "a.example.com",
            "/x",
            1000,
            |_| None,
            candidate(200, Some("max-age=0"), None),
        );
        let (key, _) = cache
            .lookup("GET", "a.example.com", "/x", |_| None)
            .unwrap();
        let updated = cache
            .apply_revalidation(&key, 2000, Some("max-age=60"), Some("xyz789"))
            .unwrap();
        assert_eq!(updated.cached_at, 2000);
        assert_eq!(updated.etag.as_deref(), Some("xyz789"));
        assert_eq!(updated.directives.max_age, Some(60));
        assert!(updated.is_fresh(2030));
    }
}
