//! CoreMetrics (spec.md §9 ambient additions).
//!
//! In-process counters exposed through `/health`. No persistence, no
//! external sink — the spec's Non-goals exclude a telemetry pipeline, but a
//! request still needs *some* way to see what the mesh has been doing, the
//! same way the teacher's `ProviderHealthStatus` carries `total_requests`/
//! `successful_requests` fields inline rather than shipping them anywhere.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct CoreMetrics {
    requests_total: AtomicU64,
    successes_total: AtomicU64,
    failures_total: AtomicU64,
    cancelled_total: AtomicU64,
    fusions_total: AtomicU64,
    circuit_opens_total: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
    /// Sum of `Response::cost` across every completed call, stored as f64
    /// bit patterns since `std` has no `AtomicF64`.
    cost_total_bits: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub successes_total: u64,
    pub failures_total: u64,
    pub cancelled_total: u64,
    pub fusions_total: u64,
    pub circuit_opens_total: u64,
    pub average_latency_ms: f64,
    pub cost_total: f64,
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, elapsed_ms: u64) {
        self.successes_total.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, elapsed_ms: u64) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fusion(&self) {
        self.fusions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_open(&self) {
        self.circuit_opens_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cost(&self, cost: f64) {
        let mut current = self.cost_total_bits.load(Ordering::Relaxed);
        loop {
            let updated = f64::from_bits(current) + cost;
            match self.cost_total_bits.compare_exchange_weak(
                current,
                updated.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            successes_total: self.successes_total.load(Ordering::Relaxed),
            failures_total: self.failures_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            fusions_total: self.fusions_total.load(Ordering::Relaxed),
            circuit_opens_total: self.circuit_opens_total.load(Ordering::Relaxed),
            average_latency_ms: if count == 0 { 0.0 } else { sum as f64 / count as f64 },
            cost_total: f64::from_bits(self.cost_total_bits.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = CoreMetrics::new();
        metrics.record_request();
        metrics.record_success(100);
        metrics.record_failure(50);
        metrics.record_cancelled();
        metrics.record_fusion();
        metrics.record_circuit_open();
        metrics.record_cost(0.002);
        metrics.record_cost(0.0005);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 1);
        assert_eq!(snap.successes_total, 1);
        assert_eq!(snap.failures_total, 1);
        assert_eq!(snap.cancelled_total, 1);
        assert_eq!(snap.fusions_total, 1);
        assert_eq!(snap.circuit_opens_total, 1);
        assert_eq!(snap.average_latency_ms, 75.0);
        assert!((snap.cost_total - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn average_latency_is_zero_with_no_samples() {
        let metrics = CoreMetrics::new();
        assert_eq!(metrics.snapshot().average_latency_ms, 0.0);
    }
}
