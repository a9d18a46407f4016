//! The stored representation of a cached response.

use bytes::Bytes;

use super::directives::CacheDirectives;

/// A single cached response.
///
/// Headers are filtered through `HeaderRewriter` before storage (open
/// question decision: filtering happens on insert, not on serve, so a
/// cache hit never needs to re-filter).
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub directives: CacheDirectives,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub cached_at: i64,
}

impl CachedEntry {
    /// Age in seconds at time `now` (unix seconds).
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.cached_at).max(0)
    }

    /// Fresh iff age is strictly less than the effective lifetime and
    /// neither `no-store` nor `private` is set. `no-cache`,
    /// `must-revalidate`, and `proxy-revalidate` force revalidation
    /// regardless of age.
    pub fn is_fresh(&self, now: i64) -> bool {
        if self.directives.no_store || self.directives.private {
            return false;
        }
        if self.directives.forces_revalidation() {
            return false;
        }
        match self.directives.lifetime_secs() {
            Some(lifetime) => self.age_secs(now) < lifetime as i64,
            None => false,
        }
    }

    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(directives: CacheDirectives, cached_at: i64) -> CachedEntry {
        CachedEntry {
            status: 200,
            headers: vec![],
            body: Bytes::from_static(b"body"),
            directives,
            etag: None,
            last_modified: None,
            cached_at,
        }
    }

    #[test]
    fn fresh_within_lifetime() {
        let e = entry(CacheDirectives::parse("max-age=60"), 1000);
        assert!(e.is_fresh(1030));
        assert!(!e.is_fresh(1061));
    }

    #[test]
    fn no_declared_lifetime_never_fresh() {
        let e = entry(CacheDirectives::default(), 1000);
        assert!(!e.is_fresh(1000));
    }

    #[test]
    fn must_revalidate_forces_revalidation_even_if_young() {
        let e = entry(CacheDirectives::parse("max-age=60, must-revalidate"), 1000);
        assert!(!e.is_fresh(1001));
    }
}
