//! The proxy's request/response pipeline.
//!
//! Rewritten from the teacher's `service/http.rs`'s `ProxyHttp` impl,
//! keeping the same per-hook responsibility split (context built in
//! `new_ctx`, routing decided in `request_filter`, peer chosen in
//! `upstream_peer`, headers rewritten in `upstream_request_filter`/
//! `response_filter`, body streamed through `response_body_filter`, errors
//! surfaced via `fail_to_connect`) but replacing the plugin-pipeline
//! dispatch with the fixed host-routing/cache/health pipeline this proxy
//! implements directly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{header, StatusCode};
use pingora_core::upstreams::peer::HttpPeer;
use pingora_error::{Error, ErrorType, Result};
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};

use crate::balancer::StrategyBalancer;
use crate::cache::{CacheService, CachedEntry, InsertCandidate};
use crate::core::ProxyError;
use crate::header_rewrite::HeaderRewriter;
use crate::host;
use crate::registry::{Host, ServiceRegistry};
use crate::utils::request::get_client_ip;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn safe_method(method: &http::Method) -> bool {
    matches!(method, &http::Method::GET | &http::Method::HEAD)
}

fn header_str(headers: &http::HeaderMap, name: impl http::header::AsHeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Per-request state threaded through the pipeline's hooks.
#[derive(Default)]
pub struct ProxyContext {
    normalized_host: String,
    path_with_query: String,
    is_safe: bool,
    selected_host: Option<Arc<Host>>,
    /// Storage key of a non-fresh-but-validator-bearing cache hit, carried
    /// so a 304 response can be merged into the entry it revalidated.
    revalidating_key: Option<String>,
    revalidating_etag: Option<String>,
    revalidating_last_modified: Option<String>,
    served_from_cache: bool,
    /// Body accumulated from the upstream response, for cache insertion.
    response_body_accum: BytesMut,
    /// Set by `response_filter` when a 304 was merged into a synthesized
    /// 200; `response_body_filter` substitutes this for the (empty)
    /// upstream 304 body.
    revalidation_synthesized_body: Option<Bytes>,
    request_body_bytes: usize,
    client_ip: String,
}

pub struct ProxyEngine {
    pub registry: Arc<ServiceRegistry>,
    pub balancer: StrategyBalancer,
    pub cache: Arc<CacheService>,
    pub header_rewriter: HeaderRewriter,
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
}

impl ProxyEngine {
    async fn respond_synthetic(
        &self,
        session: &mut Session,
        status: StatusCode,
        body: &str,
    ) -> Result<()> {
        let mut resp = ResponseHeader::build(status, None)?;
        resp.insert_header(header::CONTENT_LENGTH, body.len().to_string())?;
        resp.insert_header(header::CONTENT_TYPE, "text/plain")?;
        session.write_response_header(Box::new(resp), false).await?;
        session
            .write_response_body(Some(Bytes::copy_from_slice(body.as_bytes())), true)
            .await?;
        Ok(())
    }

    async fn serve_cached(
        &self,
        session: &mut Session,
        ctx: &mut ProxyContext,
        entry: &CachedEntry,
    ) -> Result<()> {
        let status =
            StatusCode::from_u16(entry.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut resp = ResponseHeader::build(status, None)?;
        for (name, value) in &entry.headers {
            resp.insert_header(name.clone(), value.clone())?;
        }
        resp.insert_header(header::CONTENT_LENGTH, entry.body.len().to_string())?;

        let is_head = session.req_header().method == http::Method::HEAD;
        session
            .write_response_header(Box::new(resp), is_head)
            .await?;
        if !is_head {
            session
                .write_response_body(Some(entry.body.clone()), true)
                .await?;
        }
        ctx.served_from_cache = true;
        Ok(())
    }

    fn path_with_query(req: &RequestHeader) -> String {
        match req.uri.path_and_query() {
            Some(pq) => pq.to_string(),
            None => req.uri.path().to_string(),
        }
    }
}

#[async_trait]
impl ProxyHttp for ProxyEngine {
    type CTX = ProxyContext;

    fn new_ctx(&self) -> Self::CTX {
        ProxyContext::default()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        ctx.client_ip = get_client_ip(session);

        // Step 1: reject an oversized body up front via Content-Length.
        if let Some(len) = header_str(&session.req_header().headers, header::CONTENT_LENGTH) {
            if let Ok(len) = len.parse::<usize>() {
                if len > self.max_body_bytes {
                    self.respond_synthetic(
                        session,
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Request body too large. Max size: 10MB",
                    )
                    .await?;
                    return Ok(true);
                }
            }
        }

        // Step 2: extract Host.
        let Some(raw_host) = header_str(&session.req_header().headers, header::HOST) else {
            self.respond_synthetic(session, StatusCode::BAD_REQUEST, "Missing Host header")
                .await?;
            return Ok(true);
        };

        // Step 3: normalize and resolve.
        ctx.normalized_host = host::normalize(&raw_host);
        let Some(service) = self.registry.resolve(&ctx.normalized_host) else {
            self.respond_synthetic(session, StatusCode::NOT_FOUND, "Not Found")
                .await?;
            return Ok(true);
        };

        // Step 4: path with query.
        ctx.path_with_query = Self::path_with_query(session.req_header());
        ctx.is_safe = safe_method(&session.req_header().method);

        // Step 5: invalidate on unsafe methods.
        if !ctx.is_safe {
            self.cache
                .invalidate_unsafe(&ctx.normalized_host, &ctx.path_with_query);
        }

        // Step 6: cache lookup on safe methods.
        if ctx.is_safe {
            let req_header = session.req_header().clone();
            let lookup_result = self.cache.lookup(
                req_header.method.as_str(),
                &ctx.normalized_host,
                &ctx.path_with_query,
                |name| header_str(&req_header.headers, name),
            );
            if let Some((key, entry)) = lookup_result {
                if entry.is_fresh(now_unix()) {
                    self.serve_cached(session, ctx, &entry).await?;
                    return Ok(true);
                }
                if entry.has_validators() {
                    ctx.revalidating_key = Some(key);
                    ctx.revalidating_etag = entry.etag.clone();
                    ctx.revalidating_last_modified = entry.last_modified.clone();
                }
            }
        }

        // Step 7/8: pick a healthy host.
        let healthy = service.healthy_hosts();
        if healthy.is_empty() {
            log::warn!("no healthy host for service {}", service.name);
            self.respond_synthetic(
                session,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable",
            )
            .await?;
            return Ok(true);
        }
        let service_key = self.registry.index_of(&service).unwrap_or(0);
        let Some(selected) = self.balancer.select(service.strategy, service_key, &healthy) else {
            self.respond_synthetic(
                session,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable",
            )
            .await?;
            return Ok(true);
        };

        ctx.selected_host = Some(selected);
        Ok(false)
    }

    async fn request_body_filter(
        &self,
        _session: &mut Session,
        body: &mut Option<Bytes>,
        _end_of_stream: bool,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        if let Some(chunk) = body {
            ctx.request_body_bytes += chunk.len();
            if ctx.request_body_bytes > self.max_body_bytes {
                return Err(ProxyError::ClientProtocol("request body too large".into()).into());
            }
        }
        Ok(())
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let host = ctx
            .selected_host
            .as_ref()
            .ok_or_else(|| Error::explain(ErrorType::InternalError, "no upstream host selected"))?;
        let mut peer = HttpPeer::new(host.address.clone(), false, String::new());
        peer.options.connection_timeout = Some(self.upstream_timeout);
        peer.options.read_timeout = Some(self.upstream_timeout);
        peer.options.write_timeout = Some(self.upstream_timeout);
        Ok(Box::new(peer))
    }

    async fn upstream_request_filter(
        &self,
        session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        self.header_rewriter.strip_request(upstream_request);
        upstream_request.remove_header(&header::HOST);

        let forwarded_for = match header_str(&upstream_request.headers, "x-forwarded-for") {
            Some(existing) => format!("{existing}, {}", ctx.client_ip),
            None => ctx.client_ip.clone(),
        };
        upstream_request.insert_header("x-forwarded-for", forwarded_for)?;
        let is_tls = session
            .digest()
            .map(|d| d.ssl_digest.is_some())
            .unwrap_or(false);
        upstream_request.insert_header("x-forwarded-proto", if is_tls { "https" } else { "http" })?;
        upstream_request.insert_header("x-forwarded-host", ctx.normalized_host.clone())?;

        if let Some(etag) = &ctx.revalidating_etag {
            upstream_request.insert_header("if-none-match", etag.clone())?;
        }
        if let Some(last_modified) = &ctx.revalidating_last_modified {
            upstream_request.insert_header("if-modified-since", last_modified.clone())?;
        }

        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        self.header_rewriter.strip_response(upstream_response);

        if upstream_response.status == StatusCode::NOT_MODIFIED {
            if let Some(key) = ctx.revalidating_key.clone() {
                let cache_control = header_str(&upstream_response.headers, header::CACHE_CONTROL);
                let etag = header_str(&upstream_response.headers, header::ETAG);

                if let Some(updated) = self.cache.apply_revalidation(
                    &key,
                    now_unix(),
                    cache_control.as_deref(),
                    etag.as_deref(),
                ) {
                    let response_own_headers: Vec<(String, String)> = upstream_response
                        .headers
                        .iter()
                        .map(|(n, v)| (n.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect();

                    upstream_response.set_status(StatusCode::OK)?;
                    for (name, value) in &updated.headers {
                        upstream_response.insert_header(name.clone(), value.clone())?;
                    }
                    for (name, value) in &response_own_headers {
                        upstream_response.insert_header(name.clone(), value.clone())?;
                    }
                    upstream_response
                        .insert_header(header::CONTENT_LENGTH, updated.body.len().to_string())?;

                    ctx.revalidation_synthesized_body = Some(updated.body.clone());
                }
            }
        }

        Ok(())
    }

    fn response_body_filter(
        &self,
        _session: &mut Session,
        body: &mut Option<Bytes>,
        _end_of_stream: bool,
        ctx: &mut Self::CTX,
    ) -> Result<Option<Duration>> {
        if let Some(synthesized) = ctx.revalidation_synthesized_body.take() {
            *body = Some(synthesized);
            return Ok(None);
        }
        if ctx.is_safe && !ctx.served_from_cache {
            if let Some(chunk) = body {
                ctx.response_body_accum.extend_from_slice(chunk);
            }
        }
        Ok(None)
    }

    async fn logging(&self, session: &mut Session, e: Option<&Error>, ctx: &mut Self::CTX) {
        if e.is_some() {
            if let Some(host) = &ctx.selected_host {
                host.mark_unhealthy(now_unix());
            }
        }

        if ctx.is_safe && !ctx.served_from_cache && e.is_none() {
            let insert_inputs = session.response_written().map(|resp| {
                (
                    resp.status.as_u16(),
                    header_str(&resp.headers, header::CACHE_CONTROL),
                    header_str(&resp.headers, header::VARY),
                    header_str(&resp.headers, header::ETAG),
                    header_str(&resp.headers, header::LAST_MODIFIED),
                    resp.headers
                        .iter()
                        .map(|(n, v)| (n.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect::<Vec<_>>(),
                )
            });

            if let Some((status, cache_control, vary, etag, last_modified, headers)) = insert_inputs
            {
                if status == StatusCode::OK.as_u16() {
                    let req_header = session.req_header().clone();
                    self.cache.insert(
                        req_header.method.as_str(),
                        &ctx.normalized_host,
                        &ctx.path_with_query,
                        now_unix(),
                        |name| header_str(&req_header.headers, name),
                        InsertCandidate {
                            status,
                            headers,
                            body: std::mem::take(&mut ctx.response_body_accum).freeze(),
                            cache_control: cache_control.as_deref(),
                            vary: vary.as_deref(),
                            etag: etag.as_deref(),
                            last_modified: last_modified.as_deref(),
                        },
                    );
                }
            }
        }
    }

    fn fail_to_connect(
        &self,
        _session: &mut Session,
        _peer: &HttpPeer,
        ctx: &mut Self::CTX,
        e: Box<Error>,
    ) -> Box<Error> {
        if let Some(host) = &ctx.selected_host {
            host.mark_unhealthy(now_unix());
        }
        // No retry on another host in this version: a single failed
        // attempt surfaces as 502 immediately.
        e
    }
}
