//! Service registry: host-keyed service lookup and per-host health state.
//!
//! Grounded on the teacher's `proxy::MapOperations` DashMap-over-`Arc<T>`
//! pattern (`proxy/mod.rs`) and the `DashMap`-based health-check registry in
//! `proxy/upstream/health_check.rs`, simplified to the flat "one domain maps
//! to exactly one service" contract this proxy needs (no consistent hashing,
//! no `pingora_load_balancing::Backend`).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Strategy;

/// A single upstream host belonging to a service.
#[derive(Debug)]
pub struct Host {
    pub address: String,
    healthy: AtomicBool,
    last_checked_at: AtomicI64,
}

impl Host {
    pub fn new(address: String) -> Self {
        Self {
            address,
            // Hosts start healthy: the first health-check tick corrects this,
            // and treating unchecked hosts as down would wedge the proxy on
            // a cold start before the checker has run once.
            healthy: AtomicBool::new(true),
            last_checked_at: AtomicI64::new(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn mark_healthy(&self, now_unix: i64) {
        self.healthy.store(true, Ordering::Relaxed);
        self.last_checked_at.store(now_unix, Ordering::Relaxed);
    }

    pub fn mark_unhealthy(&self, now_unix: i64) {
        self.healthy.store(false, Ordering::Relaxed);
        self.last_checked_at.store(now_unix, Ordering::Relaxed);
    }

    pub fn last_checked_at(&self) -> i64 {
        self.last_checked_at.load(Ordering::Relaxed)
    }
}

/// A routable service: a domain name, a load-balancing strategy, and a
/// fixed set of candidate hosts.
pub struct Service {
    pub name: String,
    pub domain: String,
    pub strategy: Strategy,
    pub hosts: Vec<Arc<Host>>,
}

impl Service {
    /// Hosts currently considered healthy, in configuration order.
    pub fn healthy_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts
            .iter()
            .filter(|h| h.is_healthy())
            .cloned()
            .collect()
    }
}

/// Resolves an inbound request's normalized host to a `Service`.
///
/// Keyed by domain via `DashMap`, following the teacher's
/// `MapOperations`/`DashMap<String, Arc<T>>` convention for resource lookup.
pub struct ServiceRegistry {
    by_domain: DashMap<String, Arc<Service>>,
    /// Stable identity order, used by the load balancer to key its
    /// per-service counters by index rather than by display name (a
    /// renamed service keeps its counter; two services never collide on
    /// a shared name-derived key).
    services: Vec<Arc<Service>>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<Arc<Service>>) -> Self {
        let by_domain = DashMap::new();
        for svc in &services {
            by_domain.insert(svc.domain.clone(), svc.clone());
        }
        Self {
            by_domain,
            services,
        }
    }

    /// Looks up the service registered for a normalized host. `None` if no
    /// service claims that domain.
    pub fn resolve(&self, normalized_host: &str) -> Option<Arc<Service>> {
        self.by_domain.get(normalized_host).map(|e| e.clone())
    }

    /// Stable index of a service within this registry, used as the load
    /// balancer's counter key.
    pub fn index_of(&self, service: &Arc<Service>) -> Option<usize> {
        self.services
            .iter()
            .position(|s| Arc::ptr_eq(s, service))
    }

    pub fn all_hosts(&self) -> impl Iterator<Item = Arc<Host>> + '_ {
        self.services.iter().flat_map(|s| s.hosts.iter().cloned())
    }
}
