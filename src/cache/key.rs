//! Cache key construction.
//!
//! Per the redesign note on cache-key collisions across virtual hosts: the
//! key always includes the normalized host, never just `path+query` and
//! never the full request URI (scheme included) either -- `(method,
//! normalized_host, path_with_query[, vary_fingerprint])`.

use std::collections::BTreeMap;

/// The simple (non-variant) cache key for a resource.
pub fn simple_key(method: &str, normalized_host: &str, path_with_query: &str) -> String {
    format!("{method}|{normalized_host}|{path_with_query}")
}

/// A variant key, extending the simple key with a sorted vary fingerprint.
/// `fingerprint` maps lowercased header name to exact request value.
pub fn variant_key(
    method: &str,
    normalized_host: &str,
    path_with_query: &str,
    fingerprint: &BTreeMap<String, String>,
) -> String {
    let mut key = simple_key(method, normalized_host, path_with_query);
    for (name, value) in fingerprint {
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

/// Builds the vary fingerprint for a response's `Vary` header value, given
/// the request headers that were sent. Header names not present in the
/// request contribute no entry (matching the spec's "absent headers
/// contribute no entry" rule).
pub fn vary_fingerprint<'a>(
    vary_header_names: impl Iterator<Item = &'a str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> BTreeMap<String, String> {
    let mut fingerprint = BTreeMap::new();
    for raw_name in vary_header_names {
        let name = raw_name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        if let Some(value) = lookup(&name) {
            fingerprint.insert(name, value);
        }
    }
    fingerprint
}

/// Splits a `Vary` header value into its component header names.
pub fn vary_names(vary_value: &str) -> Vec<String> {
    vary_value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_hosts_never_collide() {
        let k1 = simple_key("GET", "a.example.com", "/x");
        let k2 = simple_key("GET", "b.example.com", "/x");
        assert_ne!(k1, k2);
    }

    #[test]
    fn vary_fingerprint_skips_absent_headers() {
        let names = vary_names("Accept-Encoding, X-Missing");
        let fp = vary_fingerprint(names.iter().map(String::as_str), |name| {
            if name == "accept-encoding" {
                Some("gzip".to_string())
            } else {
                None
            }
        });
        assert_eq!(fp.len(), 1);
        assert_eq!(fp.get("accept-encoding").map(String::as_str), Some("gzip"));
    }

    #[test]
    fn variant_key_differs_from_simple_key() {
        let mut fp = BTreeMap::new();
        fp.insert("accept-encoding".to_string(), "gzip".to_string());
        let simple = simple_key("GET", "a.example.com", "/x");
        let variant = variant_key("GET", "a.example.com", "/x", &fp);
        assert_ne!(simple, variant);
    }
}
