//! HealthTracker (spec.md §4.4).
//!
//! Per-endpoint rolling latency window, in-flight counter, and a health bit,
//! keyed by `(provider_id, endpoint_id)` with no back-pointers to the
//! catalog — the design note in spec.md §9 calls this out explicitly to
//! avoid provider/endpoint reference cycles.
//!
//! Concurrency: `DashMap` (already part of the teacher's dependency stack)
//! shards the per-endpoint entries so unrelated endpoints never contend;
//! each entry's ring buffer is behind a short-lived `Mutex` only for the
//! append + average computation, never held across I/O.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::HealthConfig;
use crate::model::Outcome;

pub type EndpointKey = (String, String);

/// Fixed-size circular buffer of elapsed times, per spec.md §9.
struct RingBuffer {
    buf: Vec<Option<u64>>,
    cursor: usize,
    filled: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![None; capacity.max(1)],
            cursor: 0,
            filled: 0,
        }
    }

    fn push(&mut self, elapsed_ms: u64) {
        let cap = self.buf.len();
        self.buf[self.cursor] = Some(elapsed_ms);
        self.cursor = (self.cursor + 1) % cap;
        self.filled = (self.filled + 1).min(cap);
    }

    fn average(&self) -> Option<f64> {
        if self.filled == 0 {
            return None;
        }
        let sum: u64 = self.buf.iter().filter_map(|v| *v).sum();
        Some(sum as f64 / self.filled as f64)
    }
}

struct EndpointState {
    window: Mutex<RingBuffer>,
    in_flight: AtomicI64,
    healthy: AtomicBool,
    consecutive_non_success: AtomicI64,
    last_change: Mutex<Instant>,
}

impl EndpointState {
    fn new(window_size: usize) -> Self {
        Self {
            window: Mutex::new(RingBuffer::new(window_size)),
            in_flight: AtomicI64::new(0),
            healthy: AtomicBool::new(true),
            consecutive_non_success: AtomicI64::new(0),
            last_change: Mutex::new(Instant::now()),
        }
    }
}

/// Per-endpoint rolling latency, in-flight count, and health bit.
pub struct HealthTracker {
    endpoints: DashMap<EndpointKey, EndpointState>,
    config: HealthConfig,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            endpoints: DashMap::new(),
            config,
        }
    }

    fn entry(&self, key: &EndpointKey) -> dashmap::mapref::one::RefMut<'_, EndpointKey, EndpointState> {
        self.endpoints
            .entry(key.clone())
            .or_insert_with(|| EndpointState::new(self.config.window_size))
    }

    /// Increments the in-flight counter for this endpoint. Must be paired
    /// with exactly one `end_call` on every completion path.
    pub fn begin_call(&self, key: &EndpointKey) {
        self.entry(key).in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements in-flight, appends the elapsed time, and updates the
    /// health bit. `Cancelled` outcomes are treated as neutral (spec.md §4.6
    /// — cancellation is never counted as a failure).
    pub fn end_call(&self, key: &EndpointKey, outcome: Outcome, elapsed_ms: u64) {
        let state = self.entry(key);
        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        state.window.lock().unwrap().push(elapsed_ms);

        if outcome == Outcome::Cancelled {
            return;
        }

        let was_healthy = state.healthy.load(Ordering::SeqCst);
        let non_success = outcome != Outcome::Success;
        let run = if non_success {
            state.consecutive_non_success.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            state.consecutive_non_success.store(0, Ordering::SeqCst);
            0
        };

        let should_be_healthy = run < self.config.unhealthy_run_length as i64;
        if should_be_healthy != was_healthy {
            state.healthy.store(should_be_healthy, Ordering::SeqCst);
            *state.last_change.lock().unwrap() = Instant::now();
        }
    }

    /// Average latency in ms over the current window; falls back to
    /// `prior_ms` when the window is empty.
    pub fn avg_latency(&self, key: &EndpointKey, prior_ms: f64) -> f64 {
        self.entry(key)
            .window
            .lock()
            .unwrap()
            .average()
            .unwrap_or(prior_ms)
    }

    pub fn in_flight(&self, key: &EndpointKey) -> i64 {
        self.entry(key).in_flight.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self, key: &EndpointKey) -> bool {
        self.entry(key).healthy.load(Ordering::SeqCst)
    }

    /// 1.0 if healthy or never observed, 0.0 if unhealthy — used as the
    /// ranker's health component.
    pub fn health_score(&self, key: &EndpointKey) -> f64 {
        if self.is_healthy(key) {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(p: &str, e: &str) -> EndpointKey {
        (p.to_string(), e.to_string())
    }

    #[test]
    fn begin_end_call_pairs_track_in_flight() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        tracker.begin_call(&k);
        tracker.begin_call(&k);
        assert_eq!(tracker.in_flight(&k), 2);
        tracker.end_call(&k, Outcome::Success, 10);
        assert_eq!(tracker.in_flight(&k), 1);
        tracker.end_call(&k, Outcome::Success, 10);
        assert_eq!(tracker.in_flight(&k), 0);
    }

    #[test]
    fn avg_latency_falls_back_to_prior_when_empty() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        assert_eq!(tracker.avg_latency(&k, 250.0), 250.0);
    }

    #[test]
    fn avg_latency_is_arithmetic_mean_over_window() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        for elapsed in [100, 200, 300] {
            tracker.begin_call(&k);
            tracker.end_call(&k, Outcome::Success, elapsed);
        }
        assert_eq!(tracker.avg_latency(&k, 0.0), 200.0);
    }

    #[test]
    fn three_consecutive_failures_flip_health() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        for _ in 0..3 {
            tracker.begin_call(&k);
            tracker.end_call(&k, Outcome::Error, 10);
        }
        assert!(!tracker.is_healthy(&k));
    }

    #[test]
    fn a_success_resets_the_failure_run() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        tracker.begin_call(&k);
        tracker.end_call(&k, Outcome::Error, 10);
        tracker.begin_call(&k);
        tracker.end_call(&k, Outcome::Error, 10);
        tracker.begin_call(&k);
        tracker.end_call(&k, Outcome::Success, 10);
        tracker.begin_call(&k);
        tracker.end_call(&k, Outcome::Error, 10);
        assert!(tracker.is_healthy(&k), "run should have reset after the success");
    }

    #[test]
    fn cancelled_outcome_does_not_affect_health() {
        let tracker = HealthTracker::new(HealthConfig::default());
        let k = key("pA", "e1");
        for _ in 0..5 {
            tracker.begin_call(&k);
            tracker.end_call(&k, Outcome::Cancelled, 10);
        }
        assert!(tracker.is_healthy(&k));
    }

    #[tokio::test]
    async fn cancellation_mid_fanout_returns_in_flight_to_zero() {
        let tracker = std::sync::Arc::new(HealthTracker::new(HealthConfig::default()));
        let k = key("pA", "e1");
        let mut handles = vec![];
        for _ in 0..5 {
            let tracker = tracker.clone();
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                tracker.begin_call(&k);
                tracker.end_call(&k, Outcome::Cancelled, 1);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(tracker.in_flight(&k), 0);
    }
}
