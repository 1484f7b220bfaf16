//! LoadBalancer (spec.md §4.5).
//!
//! Chooses a single endpoint within an already-selected provider. Strategy
//! selection lives here rather than in `Ranker` because it operates at a
//! finer grain (endpoints, not providers) and needs call-scoped state
//! (a rotating cursor, an in-flight count) that the ranker has no reason
//! to carry.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::health::HealthTracker;
use crate::model::{Endpoint, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    LeastConnections,
    Weighted,
    Random,
}

/// Per-provider round-robin cursors, so rotation is independent across
/// providers and survives across calls.
pub struct LoadBalancer {
    cursors: DashMap<String, AtomicUsize>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
        }
    }

    /// Picks one enabled endpoint from `provider` per `strategy`. Returns
    /// `AllEndpointsUnhealthy` when the provider has no endpoints, or when
    /// every endpoint has a zero health score — the balancer never silently
    /// falls back to an unhealthy pool; the dispatcher decides whether to
    /// still attempt a call after observing that error.
    pub fn choose<'a>(
        &self,
        provider: &'a Provider,
        strategy: Strategy,
        health: &HealthTracker,
    ) -> CoreResult<&'a Endpoint> {
        if provider.endpoints.is_empty() {
            return Err(CoreError::AllEndpointsUnhealthy(provider.id.clone()));
        }

        let pool: Vec<&Endpoint> = provider
            .endpoints
            .iter()
            .filter(|e| health.health_score(&(provider.id.clone(), e.id.clone())) > 0.0)
            .collect();
        if pool.is_empty() {
            return Err(CoreError::AllEndpointsUnhealthy(provider.id.clone()));
        }
        let pool: &[&Endpoint] = &pool;

        let chosen = match strategy {
            Strategy::RoundRobin => {
                let cursor = self
                    .cursors
                    .entry(provider.id.clone())
                    .or_insert_with(|| AtomicUsize::new(0));
                let idx = cursor.fetch_add(1, Ordering::SeqCst) % pool.len();
                pool[idx]
            }
            Strategy::LeastConnections => {
                let key_of = |e: &Endpoint| (provider.id.clone(), e.id.clone());
                pool.iter()
                    .copied()
                    .min_by(|a, b| {
                        let in_flight_a = health.in_flight(&key_of(a));
                        let in_flight_b = health.in_flight(&key_of(b));
                        in_flight_a
                            .cmp(&in_flight_b)
                            .then_with(|| {
                                let lat_a = health.avg_latency(&key_of(a), provider.p95_latency_ms as f64);
                                let lat_b = health.avg_latency(&key_of(b), provider.p95_latency_ms as f64);
                                lat_a.partial_cmp(&lat_b).unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .then_with(|| a.id.cmp(&b.id))
                    })
                    .unwrap()
            }
            Strategy::Weighted => {
                let total_weight: f64 = pool.iter().map(|e| e.weight.max(0.0)).sum();
                if total_weight <= 0.0 {
                    pool[0]
                } else {
                    let mut pick = rand::thread_rng().gen_range(0.0..total_weight);
                    let mut selected = pool[0];
                    for e in pool {
                        pick -= e.weight.max(0.0);
                        if pick <= 0.0 {
                            selected = e;
                            break;
                        }
                    }
                    selected
                }
            }
            Strategy::Random => {
                let idx = rand::thread_rng().gen_range(0..pool.len());
                pool[idx]
            }
        };

        Ok(chosen)
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::model::Outcome;
    use std::collections::HashSet;

    fn provider_with_endpoints(ids: &[&str]) -> Provider {
        Provider {
            id: "pA".to_string(),
            name: "pA".to_string(),
            capabilities: HashSet::new(),
            models: vec![],
            cost_per_1k: 1.0,
            p50_latency_ms: 10,
            p95_latency_ms: 20,
            enabled: true,
            endpoints: ids.iter().map(|id| Endpoint::new(*id, "https://example.test")).collect(),
        }
    }

    #[test]
    fn round_robin_cycles_through_endpoints() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["e1", "e2", "e3"]);
        let mut seen = vec![];
        for _ in 0..3 {
            let e = lb.choose(&provider, Strategy::RoundRobin, &health).unwrap();
            seen.push(e.id.clone());
        }
        assert_eq!(seen, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn no_endpoints_is_all_endpoints_unhealthy() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let mut provider = provider_with_endpoints(&[]);
        provider.endpoints.clear();
        let err = lb.choose(&provider, Strategy::RoundRobin, &health).unwrap_err();
        assert!(matches!(err, CoreError::AllEndpointsUnhealthy(_)));
    }

    #[test]
    fn least_connections_prefers_idle_endpoint() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["busy", "idle"]);
        health.begin_call(&("pA".to_string(), "busy".to_string()));
        let e = lb.choose(&provider, Strategy::LeastConnections, &health).unwrap();
        assert_eq!(e.id, "idle");
    }

    #[test]
    fn random_strategy_always_returns_a_member_of_the_pool() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["e1", "e2"]);
        for _ in 0..10 {
            let e = lb.choose(&provider, Strategy::Random, &health).unwrap();
            assert!(e.id == "e1" || e.id == "e2");
        }
    }

    #[test]
    fn least_connections_breaks_ties_by_avg_latency_then_id() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["b", "a"]);
        // Both endpoints are idle (in_flight == 0), so the tie is broken by
        // avg latency, then lexicographic id.
        health.begin_call(&("pA".to_string(), "b".to_string()));
        health.end_call(&("pA".to_string(), "b".to_string()), Outcome::Success, 500);
        health.begin_call(&("pA".to_string(), "a".to_string()));
        health.end_call(&("pA".to_string(), "a".to_string()), Outcome::Success, 10);
        let e = lb.choose(&provider, Strategy::LeastConnections, &health).unwrap();
        assert_eq!(e.id, "a");
    }

    #[test]
    fn least_connections_breaks_latency_tie_by_lexicographic_id() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["z", "a"]);
        let e = lb.choose(&provider, Strategy::LeastConnections, &health).unwrap();
        assert_eq!(e.id, "a");
    }

    #[test]
    fn all_endpoints_unhealthy_surfaces_as_an_error() {
        let lb = LoadBalancer::new();
        let health = HealthTracker::new(HealthConfig::default());
        let provider = provider_with_endpoints(&["e1", "e2"]);
        for id in ["e1", "e2"] {
            for _ in 0..HealthConfig::default().unhealthy_run_length {
                let key = ("pA".to_string(), id.to_string());
                health.begin_call(&key);
                health.end_call(&key, Outcome::Error, 10);
            }
        }
        let err = lb.choose(&provider, Strategy::RoundRobin, &health).unwrap_err();
        assert!(matches!(err, CoreError::AllEndpointsUnhealthy(_)));
    }
}
