//! Core error types shared across the proxy engine.

pub mod error;

pub use error::{ProxyError, ProxyResult};
