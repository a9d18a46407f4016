//! Unified error handling for the proxy engine.
//!
//! A single enum covers every error kind the pipeline can produce, each with
//! a fixed downstream status code, a fixed human-readable body, and a log
//! level. Nothing about host identities or internal state ever leaks into
//! the body text.

use std::fmt;

use http::StatusCode;
use log::Level;

/// Unified error taxonomy for the proxy pipeline.
#[derive(Debug)]
pub enum ProxyError {
    /// Missing/invalid `Host`, oversized body, or other malformed request.
    ClientProtocol(String),
    /// No service matches the resolved host.
    Routing(String),
    /// No healthy host available for the selected service.
    Availability(String),
    /// TCP/DNS/timeout failure while talking to the upstream.
    UpstreamTransport(String),
    /// Malformed response received from the upstream.
    UpstreamProtocol(String),
    /// Internal cache inconsistency; never surfaced to the client.
    Cache(String),
    /// Uncategorized internal error.
    Internal(String),
}

impl ProxyError {
    /// Status code this error kind surfaces to the downstream client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ClientProtocol(_) => StatusCode::BAD_REQUEST,
            ProxyError::Routing(_) => StatusCode::NOT_FOUND,
            ProxyError::Availability(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed, short, human-readable body sent to the downstream client.
    ///
    /// Never includes the wrapped detail string: that string is for logs
    /// only and may contain host addresses or other internal detail.
    pub fn body(&self) -> &'static str {
        match self {
            ProxyError::ClientProtocol(_) => "Bad Request",
            ProxyError::Routing(_) => "Not Found",
            ProxyError::Availability(_) => "Service Unavailable",
            ProxyError::UpstreamTransport(_) => "Bad Gateway: Downstream service error",
            ProxyError::UpstreamProtocol(_) => "Bad Gateway: Downstream service error",
            ProxyError::Cache(_) => "Internal Server Error",
            ProxyError::Internal(_) => "Internal Server Error",
        }
    }

    /// Level routine operation of this error kind should be logged at.
    pub fn log_level(&self) -> Level {
        match self {
            ProxyError::ClientProtocol(_) | ProxyError::Routing(_) => Level::Debug,
            ProxyError::Availability(_)
            | ProxyError::UpstreamTransport(_)
            | ProxyError::UpstreamProtocol(_) => Level::Warn,
            ProxyError::Cache(_) | ProxyError::Internal(_) => Level::Error,
        }
    }

    pub fn log(&self) {
        log::log!(self.log_level(), "{self}");
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::ClientProtocol(msg) => write!(f, "client protocol error: {msg}"),
            ProxyError::Routing(msg) => write!(f, "routing error: {msg}"),
            ProxyError::Availability(msg) => write!(f, "availability error: {msg}"),
            ProxyError::UpstreamTransport(msg) => write!(f, "upstream transport error: {msg}"),
            ProxyError::UpstreamProtocol(msg) => write!(f, "upstream protocol error: {msg}"),
            ProxyError::Cache(msg) => write!(f, "cache error: {msg}"),
            ProxyError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<ProxyError> for Box<pingora_error::Error> {
    fn from(err: ProxyError) -> Self {
        use pingora_error::ErrorType;
        let kind = match &err {
            ProxyError::ClientProtocol(_) => ErrorType::Custom("client_protocol_error"),
            ProxyError::Routing(_) => ErrorType::Custom("routing_error"),
            ProxyError::Availability(_) => ErrorType::Custom("availability_error"),
            ProxyError::UpstreamTransport(_) => ErrorType::Custom("upstream_transport_error"),
            ProxyError::UpstreamProtocol(_) => ErrorType::Custom("upstream_protocol_error"),
            ProxyError::Cache(_) => ErrorType::Custom("cache_error"),
            ProxyError::Internal(_) => ErrorType::Custom("internal_error"),
        };
        pingora_error::Error::explain(kind, err.to_string())
    }
}

/// Result type alias for proxy operations.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;
