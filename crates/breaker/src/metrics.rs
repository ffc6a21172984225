//! Breaker telemetry counters.
//!
//! Three monotonic counters track the decide/report protocol: requests,
//! successes and failures. All counters use `Ordering::Relaxed` — each is
//! independent and monotonically increasing, so atomicity of the individual
//! increment is all that matters; a snapshot may observe counters a hair
//! apart, which is fine for time-aggregated telemetry.
//!
//! Decision and report spans are emitted through `tracing` under the
//! [`TELEMETRY_NAME`] target, carrying the breaker key.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Name under which the breaker emits counters and spans.
pub const TELEMETRY_NAME: &str = "DistributedCircuitBreaker";

/// Lock-free counters owned by one engine instance.
#[derive(Debug, Default)]
pub struct BreakerMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl BreakerMetrics {
    /// Creates a zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one decision.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one reported success.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one reported failure.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time view of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests.load(Ordering::Relaxed),
            successes_total: self.successes.load(Ordering::Relaxed),
            failures_total: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of breaker counters, suitable for dashboards and serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Total decisions requested from this engine.
    pub requests_total: u64,
    /// Total successes reported to this engine.
    pub successes_total: u64,
    /// Total failures reported to this engine.
    pub failures_total: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = BreakerMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_success();
        metrics.record_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.successes_total, 1);
        assert_eq!(snap.failures_total, 1);
    }

    #[test]
    fn snapshot_serializes_counter_names() {
        let snap = MetricsSnapshot { requests_total: 3, successes_total: 2, failures_total: 1 };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["requests_total"], 3);
        assert_eq!(json["successes_total"], 2);
        assert_eq!(json["failures_total"], 1);
    }
}
