//! Conformance test suite for [`BreakerStore`] implementations.
//!
//! This module provides async test functions that validate whether a
//! [`BreakerStore`] implementation correctly satisfies the trait contract.
//! Every store — in-memory, Redis-backed, or third-party — can run the same
//! suite to ensure interoperability.
//!
//! The suite deliberately avoids TTL-expiry assertions: expiry is
//! clock-dependent and each implementation tests it with its own time
//! source. Every function uses its own breaker keys so the suite can run
//! against a shared live service.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! the store under test:
//!
//! ```no_run
//! use switchgear_store::{MemoryStore, conformance};
//!
//! # async fn example() {
//! conformance::latch_roundtrip(&MemoryStore::new()).await;
//! # }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Window | Bucket alignment, cutoff, missing-bucket zero reads |
//! | Latch | Read/write/overwrite, absence semantics |
//! | Probe | Cap enforcement, over-acquire correction, negative tolerance |
//! | Ramp | Read/write, absence semantics |

use std::time::Duration;

use crate::{state::BreakerState, store::BreakerStore, window::WindowCounts};

const WINDOW: Duration = Duration::from_secs(60);
const BUCKET: Duration = Duration::from_secs(10);

/// A fixed, bucket-aligned base timestamp far from the epoch.
const NOW: u64 = 1_700_000_000;

// ============================================================================
// Window — bucket alignment, cutoff, missing buckets
// ============================================================================

/// Outcomes recorded in the same bucket interval aggregate into one bucket.
pub async fn window_counts_aggregate<S: BreakerStore>(store: &S) {
    store.record("cf:agg", true, NOW, WINDOW, BUCKET).await.expect("record");
    store.record("cf:agg", true, NOW + 9, WINDOW, BUCKET).await.expect("record");
    store.record("cf:agg", false, NOW + 9, WINDOW, BUCKET).await.expect("record");

    let counts = store.read_window("cf:agg", NOW + 9, WINDOW, BUCKET).await.expect("read_window");
    assert_eq!(counts, WindowCounts::new(2, 1), "same-bucket outcomes must aggregate");
}

/// Outcomes spread across bucket intervals all fall inside the window.
pub async fn window_spans_buckets<S: BreakerStore>(store: &S) {
    for i in 0..5 {
        let ts = NOW + i * BUCKET.as_secs();
        store.record("cf:span", i % 2 == 0, ts, WINDOW, BUCKET).await.expect("record");
    }
    let now = NOW + 4 * BUCKET.as_secs();
    let counts = store.read_window("cf:span", now, WINDOW, BUCKET).await.expect("read_window");
    assert_eq!(counts.total(), 5, "all buckets within the window must be summed");
    assert_eq!(counts, WindowCounts::new(3, 2));
}

/// Buckets older than `now - window` are not consulted, even when present.
pub async fn window_honors_cutoff<S: BreakerStore>(store: &S) {
    store.record("cf:cut", false, NOW, WINDOW, BUCKET).await.expect("record");

    // Advance "now" past the window; the failure must fall out of the
    // aggregate even though its bucket may still exist in the store.
    let later = NOW + WINDOW.as_secs() + BUCKET.as_secs();
    store.record("cf:cut", true, later, WINDOW, BUCKET).await.expect("record");

    let counts = store.read_window("cf:cut", later, WINDOW, BUCKET).await.expect("read_window");
    assert_eq!(counts, WindowCounts::new(1, 0), "cutoff must exclude stale buckets");
}

/// A breaker with no recorded outcomes reads as an empty window.
pub async fn window_missing_buckets_read_zero<S: BreakerStore>(store: &S) {
    let counts = store.read_window("cf:none", NOW, WINDOW, BUCKET).await.expect("read_window");
    assert_eq!(counts, WindowCounts::default());
}

// ============================================================================
// Latch — absence, roundtrip, overwrite
// ============================================================================

/// A breaker that was never latched reads as absent.
pub async fn latch_absent_by_default<S: BreakerStore>(store: &S) {
    assert_eq!(store.read_latch("cf:fresh").await.expect("read_latch"), None);
}

/// Every state round-trips through the latch.
pub async fn latch_roundtrip<S: BreakerStore>(store: &S) {
    for state in [BreakerState::Open, BreakerState::HalfOpen, BreakerState::Closed] {
        store.set_latch("cf:latch", state, None).await.expect("set_latch");
        assert_eq!(store.read_latch("cf:latch").await.expect("read_latch"), Some(state));
    }
}

/// Latch writes are last-writer-wins.
pub async fn latch_overwrite_wins<S: BreakerStore>(store: &S) {
    store.set_latch("cf:lww", BreakerState::Open, Some(Duration::from_secs(60))).await.expect("set");
    store.set_latch("cf:lww", BreakerState::HalfOpen, Some(Duration::from_secs(60))).await.expect("set");
    assert_eq!(store.read_latch("cf:lww").await.expect("read"), Some(BreakerState::HalfOpen));
}

// ============================================================================
// Probe — cap, over-acquire correction, negative tolerance
// ============================================================================

/// No more than `max_probes` slots can be held at once.
pub async fn probe_cap_enforced<S: BreakerStore>(store: &S) {
    let ttl = Duration::from_secs(60);
    assert!(store.try_acquire_probe("cf:cap", 2, ttl).await.expect("acquire"));
    assert!(store.try_acquire_probe("cf:cap", 2, ttl).await.expect("acquire"));
    assert!(
        !store.try_acquire_probe("cf:cap", 2, ttl).await.expect("acquire"),
        "third acquire must be refused at cap 2"
    );
}

/// Releasing a slot makes it acquirable again.
pub async fn probe_release_frees_slot<S: BreakerStore>(store: &S) {
    let ttl = Duration::from_secs(60);
    assert!(store.try_acquire_probe("cf:free", 1, ttl).await.expect("acquire"));
    assert!(!store.try_acquire_probe("cf:free", 1, ttl).await.expect("acquire"));
    store.release_probe("cf:free").await.expect("release");
    assert!(store.try_acquire_probe("cf:free", 1, ttl).await.expect("acquire"));
}

/// A refused acquire corrects its own increment: it never consumes a slot.
pub async fn probe_refusal_leaves_counter_intact<S: BreakerStore>(store: &S) {
    let ttl = Duration::from_secs(60);
    assert!(store.try_acquire_probe("cf:over", 1, ttl).await.expect("acquire"));
    for _ in 0..5 {
        assert!(!store.try_acquire_probe("cf:over", 1, ttl).await.expect("acquire"));
    }
    // One release must be enough, no matter how many refusals happened.
    store.release_probe("cf:over").await.expect("release");
    assert!(store.try_acquire_probe("cf:over", 1, ttl).await.expect("acquire"));
}

/// Releasing more than was acquired is tolerated without error.
pub async fn probe_release_tolerates_negative<S: BreakerStore>(store: &S) {
    store.release_probe("cf:neg").await.expect("release below zero");
    store.release_probe("cf:neg").await.expect("release below zero");
}

// ============================================================================
// Ramp — absence, roundtrip
// ============================================================================

/// A breaker that never ramped reads as absent.
pub async fn ramp_absent_by_default<S: BreakerStore>(store: &S) {
    assert_eq!(store.read_ramp("cf:noramp").await.expect("read_ramp"), None);
}

/// Ramp percentages round-trip, including the boundary values.
pub async fn ramp_roundtrip<S: BreakerStore>(store: &S) {
    for percent in [0u8, 25, 100] {
        store.set_ramp("cf:ramp", percent, Duration::from_secs(60)).await.expect("set_ramp");
        assert_eq!(store.read_ramp("cf:ramp").await.expect("read_ramp"), Some(percent));
    }
}

/// Runs every conformance check against the given store.
pub async fn run_all<S: BreakerStore>(store: &S) {
    window_counts_aggregate(store).await;
    window_spans_buckets(store).await;
    window_honors_cutoff(store).await;
    window_missing_buckets_read_zero(store).await;
    latch_absent_by_default(store).await;
    latch_roundtrip(store).await;
    latch_overwrite_wins(store).await;
    probe_cap_enforced(store).await;
    probe_release_frees_slot(store).await;
    probe_refusal_leaves_counter_intact(store).await;
    probe_release_tolerates_negative(store).await;
    ramp_absent_by_default(store).await;
    ramp_roundtrip(store).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn memory_store_passes_conformance() {
        run_all(&MemoryStore::new()).await;
    }
}
