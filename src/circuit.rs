//! CircuitBreaker (spec.md §4.6).
//!
//! Per-endpoint closed/open/half-open state machine, generalized from the
//! teacher's `update_health_success`/`update_health_failure` 3-strikes rule
//! in `llm/router.rs` into the full breaker spec.md calls for: a timeout-gated
//! half-open probe with a single in-flight call, `success_threshold`
//! consecutive successes to close again, and any half-open failure reopening
//! immediately.

use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;

use serde::Serialize;

use crate::config::CircuitConfig;
use crate::health::EndpointKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

struct EndpointCircuit {
    inner: Mutex<Inner>,
}

impl Default for EndpointCircuit {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

/// Per-endpoint circuit breaker registry.
pub struct CircuitBreaker {
    entries: DashMap<EndpointKey, EndpointCircuit>,
    config: CircuitConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    fn entry(&self, key: &EndpointKey) -> dashmap::mapref::one::RefMut<'_, EndpointKey, EndpointCircuit> {
        self.entries.entry(key.clone()).or_default()
    }

    /// Read-only check of whether a call would currently be permitted,
    /// without claiming the half-open probe slot. Used by the ranker to
    /// exclude open circuits from candidate lists.
    pub fn would_allow(&self, key: &EndpointKey) -> bool {
        let inner = self.entry(key).inner.lock().unwrap().state_snapshot(self.config.timeout_ms);
        inner
    }

    /// Attempts to claim permission to call this endpoint. In `HalfOpen`,
    /// only one caller at a time wins the probe slot.
    pub fn allow(&self, key: &EndpointKey) -> bool {
        let entry = self.entry(key);
        let mut inner = entry.inner.lock().unwrap();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed_ok = inner
                    .opened_at
                    .map(|t| now.duration_since(t).as_millis() as u64 >= self.config.timeout_ms)
                    .unwrap_or(false);
                if elapsed_ok {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn on_success(&self, key: &EndpointKey) {
        let entry = self.entry(key);
        let mut inner = entry.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failure, returning `true` exactly when this call caused a
    /// fresh transition into `Open` (i.e. the circuit just tripped).
    pub fn on_failure(&self, key: &EndpointKey) -> bool {
        let entry = self.entry(key);
        let mut inner = entry.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.failure_count = 0;
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.failure_count = 0;
                inner.success_count = 0;
                true
            }
            CircuitState::Open => false,
        }
    }

    pub fn state(&self, key: &EndpointKey) -> CircuitState {
        self.entry(key).inner.lock().unwrap().state
    }

    /// Whether any endpoint of a provider would currently accept a call.
    pub fn has_available_endpoint(&self, provider_id: &str, endpoint_ids: &[String]) -> bool {
        endpoint_ids
            .iter()
            .any(|eid| self.would_allow(&(provider_id.to_string(), eid.clone())))
    }
}

impl Inner {
    fn state_snapshot(&self, timeout_ms: u64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self
                .opened_at
                .map(|t| Instant::now().duration_since(t).as_millis() as u64 >= timeout_ms)
                .unwrap_or(false),
            CircuitState::HalfOpen => !self.probe_in_flight,
        }
    }
}
