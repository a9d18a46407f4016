//! Shared RFC-9111-style HTTP cache.

mod directives;
mod entry;
mod key;
mod service;
mod store;

pub use directives::CacheDirectives;
pub use entry::CachedEntry;
pub use key::{simple_key, variant_key, vary_fingerprint, vary_names};
pub use service::{CacheService, InsertCandidate};
pub use store::DEFAULT_CAPACITY;
