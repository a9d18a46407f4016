//! Hop-by-hop header stripping.
//!
//! No teacher module filters headers this way directly (Pingora strips some
//! hop-by-hop headers internally for plain passthrough proxying; the
//! teacher's plugins only ever add or rewrite specific named headers). This
//! is a spec-driven module built fresh against the static hop-by-hop list
//! plus the dynamic `Connection` token list, applied uniformly to both the
//! request heading upstream and the response heading back downstream.

use http::header::{HeaderName, HeaderValue};
use pingora_http::{RequestHeader, ResponseHeader};

/// Headers that must never be forwarded between hops, per RFC 9110 §7.6.1.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Strips hop-by-hop headers (static list plus any header named in a
/// `Connection` header) from a request before it is sent upstream.
pub struct HeaderRewriter;

impl HeaderRewriter {
    fn connection_tokens(value: &HeaderValue) -> Vec<String> {
        value
            .to_str()
            .unwrap_or("")
            .split(',')
            .map(|tok| tok.trim().to_ascii_lowercase())
            .filter(|tok| !tok.is_empty())
            .collect()
    }

    /// Names of headers to strip: the static hop-by-hop set plus whatever
    /// the `Connection` header names dynamically.
    fn names_to_strip(connection_value: Option<&HeaderValue>) -> Vec<String> {
        let mut names: Vec<String> = HOP_BY_HOP.iter().map(|s| s.to_string()).collect();
        if let Some(value) = connection_value {
            names.extend(Self::connection_tokens(value));
        }
        names
    }

    pub fn strip_request(&self, req: &mut RequestHeader) {
        let connection = req.headers.get(http::header::CONNECTION).cloned();
        for name in Self::names_to_strip(connection.as_ref()) {
            if let Ok(header_name) = name.parse::<HeaderName>() {
                req.remove_header(&header_name);
            }
        }
    }

    pub fn strip_response(&self, resp: &mut ResponseHeader) {
        let connection = resp.headers.get(http::header::CONNECTION).cloned();
        for name in Self::names_to_strip(connection.as_ref()) {
            if let Ok(header_name) = name.parse::<HeaderName>() {
                resp.remove_header(&header_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_static_hop_by_hop_from_request() {
        let mut req = RequestHeader::build("GET", b"/", None).unwrap();
        req.insert_header("Transfer-Encoding", "chunked").unwrap();
        req.insert_header("X-Custom", "keep-me").unwrap();
        HeaderRewriter.strip_request(&mut req);
        assert!(req.headers.get("transfer-encoding").is_none());
        assert!(req.headers.get("x-custom").is_some());
    }

    #[test]
    fn strips_dynamic_connection_tokens() {
        let mut resp = ResponseHeader::build(http::StatusCode::OK, None).unwrap();
        resp.insert_header("Connection", "X-Session-Token").unwrap();
        resp.insert_header("X-Session-Token", "abc123").unwrap();
        resp.insert_header("X-Other", "still-here").unwrap();
        HeaderRewriter.strip_response(&mut resp);
        assert!(resp.headers.get("connection").is_none());
        assert!(resp.headers.get("x-session-token").is_none());
        assert!(resp.headers.get("x-other").is_some());
    }
}
