//! Integration tests for the breaker engine over the in-memory store.
//!
//! A manual clock drives all bucket and TTL math; tokio's paused clock
//! drives the deferred cooldown transition where needed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use switchgear_breaker::{Breaker, BreakerOptions, BreakerState, RampOptions};
use switchgear_store::{BreakerStore, MemoryStore, testutil::ManualClock};
use tokio_util::sync::CancellationToken;

const NOW: u64 = 1_700_000_000;
const WINDOW: Duration = Duration::from_secs(60);
const BUCKET: Duration = Duration::from_secs(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    breaker: Breaker<MemoryStore>,
    store: Arc<MemoryStore>,
    clock: ManualClock,
    cancel: CancellationToken,
}

fn harness(opts: BreakerOptions) -> Harness {
    let clock = ManualClock::new(NOW);
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let breaker = Breaker::with_clock(opts, Arc::clone(&store), Arc::new(clock.clone()));
    Harness { breaker, store, clock, cancel: CancellationToken::new() }
}

/// Attaches a second engine (as another "process") to an existing harness.
fn second_engine(h: &Harness, opts: BreakerOptions) -> Breaker<MemoryStore> {
    Breaker::with_clock(opts, Arc::clone(&h.store), Arc::new(h.clock.clone()))
}

/// The hair-trigger configuration used by the literal scenarios: one sample
/// trips, one probe closes, one-second cooldown.
fn trigger_opts() -> BreakerOptions {
    BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(1)
        .failure_rate_to_open(0.5)
        .open_cooldown(Duration::from_secs(1))
        .half_open_max_probes(1)
        .half_open_successes_to_close(1)
        .ramp(
            RampOptions::builder()
                .percentages(vec![100])
                .hold_duration(Duration::from_secs(1))
                .max_failure_rate_per_step(1.0)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn staged_ramp() -> RampOptions {
    RampOptions::builder()
        .percentages(vec![25, 50, 100])
        .hold_duration(Duration::from_secs(1))
        .max_failure_rate_per_step(0.1)
        .build()
        .unwrap()
}

// ============================================================================
// Literal Scenarios
// ============================================================================

#[tokio::test]
async fn fresh_engine_failure_trips_open() {
    let h = harness(trigger_opts());

    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");
    assert!(!choice.is_probe);
    assert_eq!(choice.primary_weight_percent, 100);

    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "s");
    assert!(!choice.is_probe);
    assert_eq!(choice.primary_weight_percent, 0);
}

#[tokio::test(start_paused = true)]
async fn cooldown_probe_success_closes() {
    let h = harness(trigger_opts());

    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    // Let the deferred cooldown transition fire.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(h.breaker.state(), BreakerState::HalfOpen);

    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(probe.endpoint, "p");
    assert!(probe.is_probe);
    assert_eq!(probe.primary_weight_percent, 0);

    // Probe cap: a second immediate decision gets the secondary.
    let capped = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(capped.endpoint, "s");
    assert!(!capped.is_probe);

    h.breaker.report(true, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Closed);
    assert_eq!(h.store.read_latch("t").await.unwrap(), Some(BreakerState::Closed));
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(100));

    // A completed ramp routes everything to the primary.
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");
    assert_eq!(choice.primary_weight_percent, 100);
}

#[tokio::test]
async fn second_engine_adopts_open_without_history() {
    let h = harness(trigger_opts());
    let other = second_engine(&h, trigger_opts());

    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    let choice = other.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "s");
    assert_eq!(choice.primary_weight_percent, 0);
    assert_eq!(other.state(), BreakerState::Open);
}

#[tokio::test]
async fn healthy_ramp_step_advances() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(1)
        .failure_rate_to_open(1.0)
        .open_cooldown(Duration::from_secs(1))
        .ramp(staged_ramp())
        .build()
        .unwrap();
    let h = harness(opts);

    for _ in 0..19 {
        h.breaker.report(true, false, &h.cancel).await.unwrap();
    }
    h.store.set_ramp("t", 25, Duration::from_secs(1)).await.unwrap();

    // The 20th healthy report finds the window clean and advances the step.
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(50));

    // At a 50% step, decisions split between the endpoints.
    let mut primary = 0;
    for _ in 0..400 {
        let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
        assert_eq!(choice.primary_weight_percent, 50);
        if choice.endpoint == "p" {
            primary += 1;
        }
    }
    assert!((120..=280).contains(&primary), "50% ramp sent {primary}/400 to primary");
}

#[tokio::test]
async fn probe_failure_reopens() {
    let h = harness(trigger_opts());

    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();
    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert!(probe.is_probe);

    h.breaker.report(false, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);
    assert_eq!(h.store.read_latch("t").await.unwrap(), Some(BreakerState::Open));
}

// ============================================================================
// Threshold Properties
// ============================================================================

#[tokio::test]
async fn stays_closed_below_min_samples() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(5)
        .failure_rate_to_open(0.5)
        .open_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();
    let h = harness(opts);

    for _ in 0..4 {
        h.breaker.report(false, false, &h.cancel).await.unwrap();
        assert_eq!(h.breaker.state(), BreakerState::Closed);
    }
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");

    // The fifth sample satisfies min_samples and trips.
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);
}

#[tokio::test]
async fn trips_exactly_at_threshold_rate() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(4)
        .failure_rate_to_open(0.5)
        .open_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();
    let h = harness(opts);

    // 2 failures / 4 samples = exactly the 0.5 threshold.
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    assert_eq!(h.breaker.state(), BreakerState::Open);
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "s");
}

#[tokio::test]
async fn stays_closed_below_threshold_rate() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(4)
        .failure_rate_to_open(0.5)
        .open_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();
    let h = harness(opts);

    // 1 failure / 4 samples = 0.25, strictly below the threshold.
    for _ in 0..3 {
        h.breaker.report(true, false, &h.cancel).await.unwrap();
    }
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    assert_eq!(h.breaker.state(), BreakerState::Closed);
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");
}

#[tokio::test]
async fn failures_age_out_of_the_window() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(2)
        .failure_rate_to_open(0.5)
        .open_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();
    let h = harness(opts);

    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Closed);

    // Old failure leaves the window before the next report arrives.
    h.clock.advance(WINDOW.as_secs() + BUCKET.as_secs());
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Closed, "a lone failure must not trip");
}

// ============================================================================
// Half-Open Properties
// ============================================================================

#[tokio::test]
async fn concurrent_probes_respect_the_cap() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .open_cooldown(Duration::from_secs(1))
        .half_open_max_probes(2)
        .build()
        .unwrap();
    let h = harness(opts);
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();

    let (a, b, c, d, e, f) = tokio::join!(
        h.breaker.decide("p", "s", &h.cancel),
        h.breaker.decide("p", "s", &h.cancel),
        h.breaker.decide("p", "s", &h.cancel),
        h.breaker.decide("p", "s", &h.cancel),
        h.breaker.decide("p", "s", &h.cancel),
        h.breaker.decide("p", "s", &h.cancel),
    );
    let probes = [a, b, c, d, e, f]
        .into_iter()
        .map(|choice| choice.unwrap())
        .filter(|choice| choice.is_probe)
        .count();
    assert_eq!(probes, 2, "outstanding probes must equal the cap");
}

#[tokio::test]
async fn consecutive_probe_successes_close_once() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .open_cooldown(Duration::from_secs(1))
        .half_open_max_probes(1)
        .half_open_successes_to_close(3)
        .build()
        .unwrap();
    let h = harness(opts);
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();

    for round in 0..3 {
        let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
        assert!(probe.is_probe, "round {round} should probe");
        h.breaker.report(true, true, &h.cancel).await.unwrap();
        if round < 2 {
            assert_eq!(h.breaker.state(), BreakerState::HalfOpen);
        }
    }

    assert_eq!(h.breaker.state(), BreakerState::Closed);
    assert_eq!(h.store.read_latch("t").await.unwrap(), Some(BreakerState::Closed));
    // The ramp starts at the first configured step.
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(10));
}

#[tokio::test]
async fn probe_failure_resets_the_streak() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .open_cooldown(Duration::from_secs(1))
        .half_open_successes_to_close(2)
        .build()
        .unwrap();
    let h = harness(opts);
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();

    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert!(probe.is_probe);
    h.breaker.report(true, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::HalfOpen);

    // Failed probe: back to open, streak gone.
    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert!(probe.is_probe);
    h.breaker.report(false, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    // Recovery must need two fresh successes again.
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();
    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert!(probe.is_probe);
    h.breaker.report(true, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::HalfOpen, "one success must not close");
}

#[tokio::test]
async fn non_probe_report_in_half_open_changes_nothing() {
    let h = harness(trigger_opts());
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();

    // A straggler from before the transition reports as a non-probe.
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::HalfOpen);
}

// ============================================================================
// Ramp Properties
// ============================================================================

#[tokio::test]
async fn ramp_walks_the_declared_steps_to_completion() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(1)
        .failure_rate_to_open(1.0)
        .open_cooldown(Duration::from_secs(1))
        .ramp(
            RampOptions::builder()
                .percentages(vec![25, 50, 100])
                .hold_duration(Duration::from_secs(1))
                .max_failure_rate_per_step(1.0)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let h = harness(opts);
    h.store.set_ramp("t", 25, Duration::from_secs(1)).await.unwrap();

    h.breaker.report(true, false, &h.cancel).await.unwrap();
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(50));
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(100));

    // Completed ramp: no further writes, full primary routing.
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(100));
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");
    assert_eq!(choice.primary_weight_percent, 100);
}

#[tokio::test]
async fn failing_ramp_step_aborts_to_open() {
    let opts = BreakerOptions::builder()
        .key("t")
        .window(WINDOW)
        .bucket(BUCKET)
        .min_samples(100)
        .failure_rate_to_open(1.0)
        .open_cooldown(Duration::from_secs(1))
        .ramp(staged_ramp())
        .build()
        .unwrap();
    let h = harness(opts);
    h.store.set_ramp("t", 25, Duration::from_secs(1)).await.unwrap();

    // One failure in an otherwise empty window exceeds the 10% step allowance.
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    assert_eq!(h.breaker.state(), BreakerState::Open);
    assert_eq!(h.store.read_latch("t").await.unwrap(), Some(BreakerState::Open));
    assert_eq!(h.store.read_ramp("t").await.unwrap(), Some(0));
}

#[tokio::test]
async fn zero_percent_ramp_routes_everything_to_secondary() {
    let h = harness(trigger_opts());
    h.store.set_ramp("t", 0, Duration::from_secs(60)).await.unwrap();

    for _ in 0..20 {
        let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
        assert_eq!(choice.endpoint, "s");
        assert_eq!(choice.primary_weight_percent, 0);
        assert!(!choice.is_probe);
    }
}

#[tokio::test]
async fn expired_ramp_reads_as_complete() {
    let h = harness(trigger_opts());
    h.store.set_ramp("t", 25, Duration::from_secs(1)).await.unwrap();
    h.clock.advance(2);

    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(choice.endpoint, "p");
    assert_eq!(choice.primary_weight_percent, 100);
}

// ============================================================================
// Open-State and Transition Mechanics
// ============================================================================

#[tokio::test]
async fn open_state_reports_are_recorded_without_transitions() {
    let h = harness(trigger_opts());
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    // Stragglers keep the statistics continuous but never change state.
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    let counts = h.store.read_window("t", NOW, WINDOW, BUCKET).await.unwrap();
    assert_eq!(counts.successes, 1);
    assert_eq!(counts.failures, 1);
}

#[tokio::test]
async fn lazy_half_open_adoption_when_latch_expired() {
    let h = harness(trigger_opts());
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Open);

    // The open latch (1s TTL) expires without the cooldown task firing.
    h.clock.advance(2);
    let choice = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::HalfOpen);
    assert!(choice.is_probe);
    // The transition was re-latched for the rest of the cluster.
    assert_eq!(h.store.read_latch("t").await.unwrap(), Some(BreakerState::HalfOpen));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_the_cooldown_transition() {
    let h = harness(trigger_opts());
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    h.breaker.shutdown();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.breaker.state(), BreakerState::Open, "cancelled task must not transition");
}

#[tokio::test]
async fn engine_b_adopts_closure_by_engine_a() {
    let h = harness(trigger_opts());
    let b = second_engine(&h, trigger_opts());

    // Both engines observe the trip.
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();
    b.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(b.state(), BreakerState::Open);

    // A recovers the breaker through a probe.
    h.store.set_latch("t", BreakerState::HalfOpen, None).await.unwrap();
    let probe = h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    assert!(probe.is_probe);
    h.breaker.report(true, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Closed);

    // B's next decision adopts the authoritative latch before returning.
    let choice = b.decide("p", "s", &h.cancel).await.unwrap();
    assert_eq!(b.state(), BreakerState::Closed);
    assert_eq!(choice.endpoint, "p");
}

// ============================================================================
// Misuse, Cancellation, Telemetry
// ============================================================================

#[tokio::test]
async fn probe_report_outside_half_open_is_a_regular_report() {
    let h = harness(trigger_opts());

    // Claims to be a probe, but the engine never left closed.
    h.breaker.report(true, true, &h.cancel).await.unwrap();
    assert_eq!(h.breaker.state(), BreakerState::Closed);

    let counts = h.store.read_window("t", NOW, WINDOW, BUCKET).await.unwrap();
    assert_eq!(counts.successes, 1);
}

#[tokio::test]
async fn cancelled_decide_propagates_without_deciding() {
    let h = harness(trigger_opts());
    h.cancel.cancel();

    let err = h.breaker.decide("p", "s", &h.cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn cancelled_report_records_nothing() {
    let h = harness(trigger_opts());
    h.cancel.cancel();

    let err = h.breaker.report(false, false, &h.cancel).await.unwrap_err();
    assert!(err.is_cancelled());

    let counts = h.store.read_window("t", NOW, WINDOW, BUCKET).await.unwrap();
    assert_eq!(counts.total(), 0, "cancellation beat the record call");
    assert_eq!(h.breaker.state(), BreakerState::Closed, "cancellation never alters state");
}

#[tokio::test]
async fn counters_track_the_protocol() {
    let h = harness(trigger_opts());

    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(true, false, &h.cancel).await.unwrap();
    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    let snap = h.breaker.metrics();
    assert_eq!(snap.requests_total, 2);
    assert_eq!(snap.successes_total, 1);
    assert_eq!(snap.failures_total, 1);
}

#[tokio::test]
async fn clones_share_cached_state() {
    let h = harness(trigger_opts());
    let clone = h.breaker.clone();

    h.breaker.decide("p", "s", &h.cancel).await.unwrap();
    h.breaker.report(false, false, &h.cancel).await.unwrap();

    assert_eq!(clone.state(), BreakerState::Open);
    assert_eq!(clone.metrics().requests_total, 1);
}
