//! Load balancing strategies.
//!
//! The teacher picks upstreams through `pingora_load_balancing`'s
//! consistent-hashing `LoadBalancer<BS>`; this proxy's contract is the
//! simpler `select(service) -> host | nil` spec.md §4.3 describes, so the
//! strategies are hand-rolled directly over `Vec<Arc<Host>>`.
//!
//! Per the redesign flag on counter keys: round-robin counters are keyed by
//! a service's stable registry index (its identity), never by its display
//! name, so renaming a service in config doesn't reset or collide its
//! counter with another service's.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;

use crate::config::Strategy;
use crate::registry::Host;

/// Picks a healthy host for a service out of a slice of already-filtered
/// healthy candidates.
pub trait LoadBalancer: Send + Sync {
    /// `candidates` is expected to already be filtered to healthy hosts.
    /// `service_key` is the stable identity (registry index) of the
    /// service being balanced, used to key any internal per-service state.
    fn select(&self, service_key: usize, candidates: &[Arc<Host>]) -> Option<Arc<Host>>;
}

/// Round-robin over the healthy host list, one atomic counter per service.
#[derive(Default)]
pub struct RoundRobin {
    counters: DashMap<usize, AtomicUsize>,
}

impl LoadBalancer for RoundRobin {
    fn select(&self, service_key: usize, candidates: &[Arc<Host>]) -> Option<Arc<Host>> {
        if candidates.is_empty() {
            return None;
        }
        let counter = self
            .counters
            .entry(service_key)
            .or_insert_with(|| AtomicUsize::new(0));
        let idx = counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].clone())
    }
}

/// Uniform random selection among healthy hosts.
#[derive(Default)]
pub struct Random;

impl LoadBalancer for Random {
    fn select(&self, _service_key: usize, candidates: &[Arc<Host>]) -> Option<Arc<Host>> {
        if candidates.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[idx].clone())
    }
}

/// Dispatches to the strategy a service was configured with. A service's
/// `strategy` is resolved once per call rather than compiled into a
/// polymorphic object, since the set of strategies is small and fixed.
#[derive(Default)]
pub struct StrategyBalancer {
    round_robin: RoundRobin,
    random: Random,
}

impl StrategyBalancer {
    pub fn select(
        &self,
        strategy: Strategy,
        service_key: usize,
        candidates: &[Arc<Host>],
    ) -> Option<Arc<Host>> {
        match strategy {
            Strategy::RoundRobin => self.round_robin.select(service_key, candidates),
            Strategy::Random => self.random.select(service_key, candidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize) -> Vec<Arc<Host>> {
        (0..n)
            .map(|i| Arc::new(Host::new(format!("h{i}"))))
            .collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let lb = RoundRobin::default();
        let candidates = hosts(3);
        let picks: Vec<_> = (0..6)
            .map(|_| lb.select(0, &candidates).unwrap().address.clone())
            .collect();
        assert_eq!(
            picks,
            vec!["h0", "h1", "h2", "h0", "h1", "h2"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn round_robin_counters_keyed_by_service_not_shared() {
        let lb = RoundRobin::default();
        let candidates = hosts(2);
        assert_eq!(lb.select(0, &candidates).unwrap().address, "h0");
        assert_eq!(lb.select(1, &candidates).unwrap().address, "h0");
        assert_eq!(lb.select(0, &candidates).unwrap().address, "h1");
    }

    #[test]
    fn empty_candidates_returns_none() {
        let lb = RoundRobin::default();
        assert!(lb.select(0, &[]).is_none());
        assert!(Random.select(0, &[]).is_none());
    }

    #[test]
    fn random_picks_from_candidates() {
        let candidates = hosts(4);
        let addrs: Vec<_> = candidates.iter().map(|h| h.address.clone()).collect();
        for _ in 0..20 {
            let pick = Random.select(0, &candidates).unwrap();
            assert!(addrs.contains(&pick.address));
        }
    }
}
