//! `Cache-Control` directive parsing.
//!
//! Grounded on the directive vocabulary used by `examples/06chaynes-http-cache`
//! and `examples/aleasims-http-cache`, but tokenized per spec rather than via
//! substring containment: the reference source this spec was distilled from
//! used `contains("private")`-style checks, which false-match an unknown
//! directive that merely contains the substring. Here the header is split on
//! `,`, each token trimmed, then split on `=` before classification.

/// Parsed `Cache-Control` directives relevant to shared-cache behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    pub no_store: bool,
    pub no_cache: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub private: bool,
    pub public: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
}

impl CacheDirectives {
    /// Parses a raw `Cache-Control` header value. Unknown or malformed
    /// tokens are ignored; a malformed `max-age`/`s-maxage` value (not a
    /// non-negative integer) is dropped rather than causing a parse error.
    pub fn parse(raw: &str) -> Self {
        let mut directives = CacheDirectives::default();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let mut parts = token.splitn(2, '=');
            let name = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let value = parts.next().map(|v| v.trim());
            match name.as_str() {
                "no-store" => directives.no_store = true,
                "no-cache" => directives.no_cache = true,
                "must-revalidate" => directives.must_revalidate = true,
                "proxy-revalidate" => directives.proxy_revalidate = true,
                "private" => directives.private = true,
                "public" => directives.public = true,
                "max-age" => {
                    if let Some(v) = value.and_then(|v| v.parse::<u64>().ok()) {
                        directives.max_age = Some(v);
                    }
                }
                "s-maxage" => {
                    if let Some(v) = value.and_then(|v| v.parse::<u64>().ok()) {
                        directives.s_maxage = Some(v);
                    }
                }
                _ => {}
            }
        }
        directives
    }

    /// Whether a backend response carrying these directives is eligible
    /// for insertion into a shared cache, per the declared-freshness rule
    /// (no heuristic freshness: at least one of `public`, `max-age`,
    /// `s-maxage` must be present).
    pub fn cacheable_for_insert(&self) -> bool {
        if self.no_store || self.private {
            return false;
        }
        self.public || self.max_age.is_some() || self.s_maxage.is_some()
    }

    /// Effective freshness lifetime in seconds: `s-maxage` takes priority
    /// over `max-age`; `None` means "treat as not fresh" (no heuristic
    /// freshness is computed).
    pub fn lifetime_secs(&self) -> Option<u64> {
        self.s_maxage.or(self.max_age)
    }

    /// Whether revalidation is forced regardless of freshness.
    pub fn forces_revalidation(&self) -> bool {
        self.no_cache || self.must_revalidate || self.proxy_revalidate
    }

    /// Overlays directives named in `raw` onto `self`, overwriting only
    /// the fields that actually appear. Used when a `304` revalidation
    /// response carries its own `Cache-Control`: fields it doesn't mention
    /// are left as previously stored.
    pub fn overlay(&mut self, raw: &str) {
        let incoming = Self::parse(raw);
        for token in raw.split(',') {
            let name = token
                .split('=')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            match name.as_str() {
                "no-store" => self.no_store = incoming.no_store,
                "no-cache" => self.no_cache = incoming.no_cache,
                "must-revalidate" => self.must_revalidate = incoming.must_revalidate,
                "proxy-revalidate" => self.proxy_revalidate = incoming.proxy_revalidate,
                "private" => self.private = incoming.private,
                "public" => self.public = incoming.public,
                "max-age" => self.max_age = incoming.max_age,
                "s-maxage" => self.s_maxage = incoming.s_maxage,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_and_does_not_substring_match() {
        // "private" must not false-match inside "semi-private-thing".
        let d = CacheDirectives::parse("max-age=60, semi-private-thing");
        assert!(!d.private);
        assert_eq!(d.max_age, Some(60));
    }

    #[test]
    fn rejects_malformed_max_age() {
        let d = CacheDirectives::parse("max-age=notanumber");
        assert_eq!(d.max_age, None);
    }

    #[test]
    fn cacheable_requires_declared_freshness_or_public() {
        assert!(!CacheDirectives::default().cacheable_for_insert());
        assert!(CacheDirectives::parse("public").cacheable_for_insert());
        assert!(CacheDirectives::parse("max-age=10").cacheable_for_insert());
        assert!(CacheDirectives::parse("s-maxage=10").cacheable_for_insert());
        assert!(!CacheDirectives::parse("private, max-age=10").cacheable_for_insert());
        assert!(!CacheDirectives::parse("no-store, public").cacheable_for_insert());
    }

    #[test]
    fn s_maxage_takes_priority_over_max_age() {
        let d = CacheDirectives::parse("max-age=10, s-maxage=99");
        assert_eq!(d.lifetime_secs(), Some(99));
    }

    #[test]
    fn case_insensitive() {
        let d = CacheDirectives::parse("NO-STORE, MAX-AGE=5");
        assert!(d.no_store);
        assert_eq!(d.max_age, Some(5));
    }

    #[test]
    fn overlay_only_touches_named_fields() {
        let mut d = CacheDirectives::parse("max-age=0, must-revalidate");
        d.overlay("max-age=60");
        assert_eq!(d.max_age, Some(60));
        // must-revalidate wasn't mentioned in the overlay, stays set.
        assert!(d.must_revalidate);
    }
}
