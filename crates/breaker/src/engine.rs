//! The breaker engine: decision and report logic over a shared store.
//!
//! Callers bracket every protected operation with two calls:
//! [`decide`](Breaker::decide) picks the endpoint, the caller performs the
//! I/O, then [`report`](Breaker::report) feeds the outcome back. All durable
//! state lives in the [`BreakerStore`]; the engine keeps only a volatile
//! cache of the last observed state and an in-process streak of consecutive
//! probe successes.
//!
//! # Local cache vs. authoritative latch
//!
//! The latch in the store is authoritative and is read on every decision.
//! The cached state only makes the branch afterwards lock-free; divergence
//! between the two is bounded by one `decide`.
//!
//! # Concurrency
//!
//! The engine is lock-free: the cached state is an atomic word with
//! release/acquire ordering, the probe streak an atomic counter, and no
//! local lock is ever held across a store call. Conflicting transitions
//! from concurrent calls are harmless — the latch is last-writer-wins and
//! reconciles on the next decision.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU32, Ordering},
    },
};

use rand::Rng;
use switchgear_store::{BreakerState, BreakerStore, Clock, StoreResult, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    error::{BreakerError, BreakerResult},
    metrics::{BreakerMetrics, MetricsSnapshot, TELEMETRY_NAME},
    options::BreakerOptions,
};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

const fn encode(state: BreakerState) -> u8 {
    match state {
        BreakerState::Closed => CLOSED,
        BreakerState::Open => OPEN,
        BreakerState::HalfOpen => HALF_OPEN,
    }
}

const fn decode(raw: u8) -> BreakerState {
    match raw {
        OPEN => BreakerState::Open,
        HALF_OPEN => BreakerState::HalfOpen,
        _ => BreakerState::Closed,
    }
}

/// The outcome of one decision.
///
/// `endpoint` is one of the two endpoints passed to
/// [`decide`](Breaker::decide). When `is_probe` is set the caller must pass
/// it back through [`report`](Breaker::report) so the probe slot is
/// returned. `primary_weight_percent` reflects the active recovery ramp:
/// `100` outside recovery, `0` while open or probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointChoice<E> {
    /// The endpoint the caller should send this request to.
    pub endpoint: E,
    /// Whether this request is a half-open probe.
    pub is_probe: bool,
    /// The percentage of traffic currently routed toward the primary.
    pub primary_weight_percent: u8,
}

/// Races a store operation against the caller's cancellation signal.
async fn cancellable<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = StoreResult<T>>,
) -> BreakerResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BreakerError::Cancelled),
        result = op => result.map_err(BreakerError::from),
    }
}

struct Inner<S> {
    opts: BreakerOptions,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    /// Last observed state; the latch is authoritative.
    state: AtomicU8,
    /// Consecutive probe successes, meaningful only while half-open.
    probe_streak: AtomicU32,
    metrics: BreakerMetrics,
    /// Cancelled on shutdown; every deferred transition task selects on it.
    lifetime: CancellationToken,
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

/// A distributed circuit breaker engine.
///
/// Engines sharing a store and a key are the same logical breaker: any
/// transition by one becomes visible to the others on their next decision.
/// Within a process the engine is intended to be shared (clone it — clones
/// are cheap and share the cached state and probe streak).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use switchgear_breaker::{Breaker, BreakerOptions};
/// use switchgear_store::MemoryStore;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let opts = BreakerOptions::builder().key("checkout-api").build()?;
///     let breaker = Breaker::new(opts, Arc::new(MemoryStore::new()));
///     let cancel = CancellationToken::new();
///
///     let choice = breaker.decide("https://primary", "https://fallback", &cancel).await?;
///     // ... call choice.endpoint ...
///     breaker.report(true, choice.is_probe, &cancel).await?;
///     Ok(())
/// }
/// ```
pub struct Breaker<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Breaker<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S> std::fmt::Debug for Breaker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("key", &self.inner.opts.key())
            .field("state", &decode(self.inner.state.load(Ordering::Acquire)))
            .finish_non_exhaustive()
    }
}

impl<S: BreakerStore + 'static> Breaker<S> {
    /// Creates a new engine on the system clock.
    ///
    /// The engine starts closed with no latch and no ramp; if the store
    /// already holds a latch for this key, it is adopted on the first
    /// decision.
    #[must_use]
    pub fn new(options: BreakerOptions, store: Arc<S>) -> Self {
        Self::with_clock(options, store, Arc::new(SystemClock))
    }

    /// Creates a new engine on the given clock.
    #[must_use]
    pub fn with_clock(options: BreakerOptions, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                opts: options,
                store,
                clock,
                state: AtomicU8::new(CLOSED),
                probe_streak: AtomicU32::new(0),
                metrics: BreakerMetrics::new(),
                lifetime: CancellationToken::new(),
            }),
        }
    }

    /// Picks the endpoint for one protected call.
    ///
    /// Reads the authoritative latch, adopts it if it differs from the
    /// cached state, and routes:
    ///
    /// - **Open** — the secondary, always.
    /// - **Half-open** — the primary as a probe if a cluster-wide probe
    ///   slot could be claimed, otherwise the secondary.
    /// - **Closed** — the primary, weighted by the active recovery ramp.
    ///
    /// # Errors
    ///
    /// Any store error is fatal to the decision and propagates: without the
    /// latch there is no safe default. Cancellation propagates as
    /// [`BreakerError::Cancelled`].
    pub async fn decide<E>(
        &self,
        primary: E,
        secondary: E,
        cancel: &CancellationToken,
    ) -> BreakerResult<EndpointChoice<E>> {
        let inner = &*self.inner;
        inner.metrics.record_request();
        let span = tracing::info_span!(target: TELEMETRY_NAME, "choose", breaker = %inner.opts.key());
        async move {
            match self.sync_with_latch(cancel).await? {
                BreakerState::Open => {
                    Ok(EndpointChoice { endpoint: secondary, is_probe: false, primary_weight_percent: 0 })
                },
                BreakerState::HalfOpen => {
                    let acquired = cancellable(
                        cancel,
                        inner.store.try_acquire_probe(
                            inner.opts.key(),
                            inner.opts.half_open_max_probes(),
                            inner.opts.open_cooldown(),
                        ),
                    )
                    .await?;
                    if acquired {
                        Ok(EndpointChoice { endpoint: primary, is_probe: true, primary_weight_percent: 0 })
                    } else {
                        Ok(EndpointChoice { endpoint: secondary, is_probe: false, primary_weight_percent: 0 })
                    }
                },
                BreakerState::Closed => {
                    let ramp = cancellable(cancel, inner.store.read_ramp(inner.opts.key())).await?;
                    match ramp {
                        None => Ok(EndpointChoice {
                            endpoint: primary,
                            is_probe: false,
                            primary_weight_percent: 100,
                        }),
                        Some(percent) if percent >= 100 => Ok(EndpointChoice {
                            endpoint: primary,
                            is_probe: false,
                            primary_weight_percent: 100,
                        }),
                        Some(percent) => {
                            let draw = rand::rng().random_range(0..100u8);
                            let endpoint = if draw < percent { primary } else { secondary };
                            Ok(EndpointChoice {
                                endpoint,
                                is_probe: false,
                                primary_weight_percent: percent,
                            })
                        },
                    }
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Feeds the outcome of one protected call back into the breaker.
    ///
    /// The outcome is always recorded in the sliding window, whatever the
    /// state — statistics stay continuous across transitions. State is then
    /// evaluated: closed reports check the failure threshold and the
    /// recovery ramp; half-open probe reports return the probe slot and
    /// advance or reset the close streak.
    ///
    /// # Errors
    ///
    /// Only a failure of the mandatory outcome recording propagates.
    /// Probe-release and post-transition writes are logged and swallowed —
    /// the missing writes reconcile on a later report. Cancellation always
    /// propagates as [`BreakerError::Cancelled`].
    pub async fn report(
        &self,
        success: bool,
        was_probe: bool,
        cancel: &CancellationToken,
    ) -> BreakerResult<()> {
        let inner = &*self.inner;
        let span = tracing::info_span!(
            target: TELEMETRY_NAME,
            "report",
            breaker = %inner.opts.key(),
            success,
            was_probe,
        );
        async move {
            let now = inner.clock.now_unix();
            cancellable(
                cancel,
                inner.store.record(inner.opts.key(), success, now, inner.opts.window(), inner.opts.bucket()),
            )
            .await?;
            if success {
                inner.metrics.record_success();
            } else {
                inner.metrics.record_failure();
            }

            let local = decode(inner.state.load(Ordering::Acquire));
            if was_probe && local != BreakerState::HalfOpen {
                tracing::warn!(
                    target: TELEMETRY_NAME,
                    breaker = %inner.opts.key(),
                    state = %local,
                    "probe outcome reported outside half-open; handling as a regular report",
                );
            }

            match local {
                BreakerState::Closed => {
                    self.swallow(self.evaluate_open(cancel).await, "failure-rate evaluation")?;
                    // Skip the ramp once the threshold check tripped us open.
                    if decode(inner.state.load(Ordering::Acquire)) == BreakerState::Closed {
                        self.swallow(self.evaluate_ramp(cancel).await, "ramp evaluation")?;
                    }
                    Ok(())
                },
                BreakerState::HalfOpen if was_probe => self.settle_probe(success, cancel).await,
                _ => Ok(()),
            }
        }
        .instrument(span)
        .await
    }

    /// Returns the locally cached state.
    ///
    /// Observational and eventually consistent with the latch; the next
    /// [`decide`](Breaker::decide) reconciles any divergence.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        decode(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns a snapshot of this engine's request/outcome counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Returns this engine's configuration.
    #[must_use]
    pub fn options(&self) -> &BreakerOptions {
        &self.inner.opts
    }

    /// Cancels the engine's deferred transition tasks.
    ///
    /// Also happens automatically when the last handle (including handles
    /// held by pending tasks) is dropped.
    pub fn shutdown(&self) {
        self.inner.lifetime.cancel();
    }

    /// Reads the latch and resolves the cached state toward it.
    ///
    /// An absent latch while the cache says open means the open latch
    /// expired before the cooldown task fired (or the task's process died);
    /// half-open is adopted and re-latched best-effort so the cluster
    /// converges without a per-breaker background task.
    async fn sync_with_latch(&self, cancel: &CancellationToken) -> BreakerResult<BreakerState> {
        let inner = &*self.inner;
        let latch = cancellable(cancel, inner.store.read_latch(inner.opts.key())).await?;
        let local = decode(inner.state.load(Ordering::Acquire));
        match latch {
            Some(remote) if remote != local => {
                inner.state.store(encode(remote), Ordering::Release);
                inner.probe_streak.store(0, Ordering::Release);
                tracing::debug!(
                    target: TELEMETRY_NAME,
                    breaker = %inner.opts.key(),
                    from = %local,
                    to = %remote,
                    "adopted latched state",
                );
                Ok(remote)
            },
            Some(remote) => Ok(remote),
            None if local == BreakerState::Open => {
                inner.state.store(HALF_OPEN, Ordering::Release);
                inner.probe_streak.store(0, Ordering::Release);
                tracing::debug!(
                    target: TELEMETRY_NAME,
                    breaker = %inner.opts.key(),
                    "open latch expired, adopting half-open",
                );
                let relatch = cancellable(
                    cancel,
                    inner.store.set_latch(
                        inner.opts.key(),
                        BreakerState::HalfOpen,
                        Some(inner.opts.open_cooldown()),
                    ),
                )
                .await;
                self.swallow(relatch, "half-open re-latch")?;
                Ok(BreakerState::HalfOpen)
            },
            None => Ok(local),
        }
    }

    /// Checks the window failure rate and trips the breaker when it crosses
    /// the configured threshold with enough samples.
    async fn evaluate_open(&self, cancel: &CancellationToken) -> BreakerResult<()> {
        let inner = &*self.inner;
        let counts = cancellable(
            cancel,
            inner.store.read_window(
                inner.opts.key(),
                inner.clock.now_unix(),
                inner.opts.window(),
                inner.opts.bucket(),
            ),
        )
        .await?;
        if counts.total() >= inner.opts.min_samples()
            && counts.failure_rate() >= inner.opts.failure_rate_to_open()
        {
            tracing::warn!(
                target: TELEMETRY_NAME,
                breaker = %inner.opts.key(),
                samples = counts.total(),
                failure_rate = counts.failure_rate(),
                "failure rate crossed threshold",
            );
            self.trip_open(cancel).await?;
        }
        Ok(())
    }

    /// Advances the recovery ramp one step, or aborts recovery when the
    /// current step's failure rate is too high.
    async fn evaluate_ramp(&self, cancel: &CancellationToken) -> BreakerResult<()> {
        let inner = &*self.inner;
        let Some(current) = cancellable(cancel, inner.store.read_ramp(inner.opts.key())).await?
        else {
            return Ok(());
        };
        if current >= 100 {
            return Ok(());
        }

        let counts = cancellable(
            cancel,
            inner.store.read_window(
                inner.opts.key(),
                inner.clock.now_unix(),
                inner.opts.window(),
                inner.opts.bucket(),
            ),
        )
        .await?;
        if counts.failure_rate() > inner.opts.ramp().max_failure_rate_per_step() {
            tracing::warn!(
                target: TELEMETRY_NAME,
                breaker = %inner.opts.key(),
                step = current,
                failure_rate = counts.failure_rate(),
                "recovery ramp step failing, re-opening",
            );
            return self.trip_open(cancel).await;
        }

        let percentages = inner.opts.ramp().percentages();
        let next = match percentages.iter().position(|&p| p == current) {
            Some(i) if i + 1 < percentages.len() => percentages[i + 1],
            _ => 100,
        };
        cancellable(
            cancel,
            inner.store.set_ramp(inner.opts.key(), next, inner.opts.ramp().hold_duration()),
        )
        .await?;
        tracing::debug!(
            target: TELEMETRY_NAME,
            breaker = %inner.opts.key(),
            from = current,
            to = next,
            "advanced recovery ramp",
        );
        Ok(())
    }

    /// Returns the probe slot, then advances or resets the close streak.
    ///
    /// The release comes first so the slot is blocked for as short a window
    /// as possible; an unreleased slot self-heals through its TTL anyway.
    async fn settle_probe(&self, success: bool, cancel: &CancellationToken) -> BreakerResult<()> {
        let inner = &*self.inner;
        let released = cancellable(cancel, inner.store.release_probe(inner.opts.key())).await;
        self.swallow(released, "probe release")?;

        if success {
            let streak = inner.probe_streak.fetch_add(1, Ordering::AcqRel) + 1;
            if streak == inner.opts.half_open_successes_to_close() {
                inner.probe_streak.store(0, Ordering::Release);
                inner.state.store(CLOSED, Ordering::Release);
                tracing::info!(
                    target: TELEMETRY_NAME,
                    breaker = %inner.opts.key(),
                    consecutive_successes = streak,
                    "breaker closed after successful probes",
                );
                let latched = cancellable(
                    cancel,
                    inner.store.set_latch(inner.opts.key(), BreakerState::Closed, None),
                )
                .await;
                self.swallow(latched, "closed latch write")?;
                if let Some(&first_step) = inner.opts.ramp().percentages().first() {
                    let ramped = cancellable(
                        cancel,
                        inner.store.set_ramp(
                            inner.opts.key(),
                            first_step,
                            inner.opts.ramp().hold_duration(),
                        ),
                    )
                    .await;
                    self.swallow(ramped, "ramp initialization")?;
                }
            }
            Ok(())
        } else {
            inner.probe_streak.store(0, Ordering::Release);
            let tripped = self.trip_open(cancel).await;
            self.swallow(tripped, "probe-failure trip")
        }
    }

    /// Moves the breaker to open: latch with cooldown TTL, suppress the
    /// ramp, and schedule the deferred half-open transition. Idempotent.
    async fn trip_open(&self, cancel: &CancellationToken) -> BreakerResult<()> {
        let inner = &*self.inner;
        let previous = decode(inner.state.swap(OPEN, Ordering::AcqRel));
        inner.probe_streak.store(0, Ordering::Release);
        if previous != BreakerState::Open {
            tracing::warn!(
                target: TELEMETRY_NAME,
                breaker = %inner.opts.key(),
                from = %previous,
                cooldown_secs = inner.opts.open_cooldown().as_secs(),
                "breaker opened",
            );
        }

        let latched = cancellable(
            cancel,
            inner.store.set_latch(
                inner.opts.key(),
                BreakerState::Open,
                Some(inner.opts.open_cooldown()),
            ),
        )
        .await;
        let ramped = cancellable(
            cancel,
            inner.store.set_ramp(inner.opts.key(), 0, inner.opts.ramp().hold_duration()),
        )
        .await;
        // Schedule before propagating write failures: the cooldown must
        // elapse into half-open even when the store was briefly unreachable.
        self.spawn_cooldown_transition();
        latched?;
        ramped?;
        Ok(())
    }

    /// Spawns the deferred Open→HalfOpen transition, attached to the engine
    /// lifetime.
    fn spawn_cooldown_transition(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let lifetime = inner.lifetime.clone();
            tokio::select! {
                () = lifetime.cancelled() => {},
                () = tokio::time::sleep(inner.opts.open_cooldown()) => {
                    // Only Open may move to HalfOpen; anything else means a
                    // newer transition already won.
                    if inner
                        .state
                        .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        inner.probe_streak.store(0, Ordering::Release);
                        tracing::info!(
                            target: TELEMETRY_NAME,
                            breaker = %inner.opts.key(),
                            "cooldown elapsed, entering half-open",
                        );
                        if let Err(error) = inner
                            .store
                            .set_latch(
                                inner.opts.key(),
                                BreakerState::HalfOpen,
                                Some(inner.opts.open_cooldown()),
                            )
                            .await
                        {
                            tracing::warn!(
                                target: TELEMETRY_NAME,
                                breaker = %inner.opts.key(),
                                %error,
                                "failed to latch half-open after cooldown",
                            );
                        }
                    }
                },
            }
        });
    }

    /// Logs and absorbs store errors from best-effort operations;
    /// cancellation still propagates.
    fn swallow(&self, result: BreakerResult<()>, operation: &'static str) -> BreakerResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(BreakerError::Cancelled) => Err(BreakerError::Cancelled),
            Err(BreakerError::Store(error)) => {
                tracing::warn!(
                    target: TELEMETRY_NAME,
                    breaker = %self.inner.opts.key(),
                    operation,
                    %error,
                    "best-effort store operation failed; state reconciles on a later report",
                );
                Ok(())
            },
        }
    }
}
