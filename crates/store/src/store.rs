//! Breaker store trait definition.
//!
//! This module defines the [`BreakerStore`] trait, the contract between the
//! breaker engine and the distributed key-value store that holds all durable
//! breaker state. Every store implementation (in-memory, Redis, etc.)
//! implements this trait.
//!
//! # Design Philosophy
//!
//! One logical breaker occupies four narrow pieces of shared state:
//!
//! - **Buckets** — time-aligned success/failure counters with a TTL
//! - **Latch** — the authoritative cluster-wide state value
//! - **Probe semaphore** — a TTL'd counter bounding half-open probes
//! - **Ramp** — a TTL'd percentage restoring primary traffic after recovery
//!
//! Every operation is atomic against a single logical key; no cross-key
//! transactions are assumed. This keeps the contract implementable on any
//! service that offers atomic increments and expiring keys.
//!
//! Implementations must be safe to share across threads **and** processes:
//! two engines using the same store and breaker key are the same logical
//! breaker. Implementations expose no state to the engine beyond these
//! operations.

use std::time::Duration;

use async_trait::async_trait;

use crate::{error::StoreResult, state::BreakerState, window::WindowCounts};

/// Distributed state store for circuit breakers.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`record`](BreakerStore::record) | Count one outcome in the bucket at the aligned epoch |
/// | [`read_window`](BreakerStore::read_window) | Aggregate counts over the sliding window |
/// | [`read_latch`](BreakerStore::read_latch) | Read the authoritative breaker state |
/// | [`set_latch`](BreakerStore::set_latch) | Write the breaker state, optionally with TTL |
/// | [`try_acquire_probe`](BreakerStore::try_acquire_probe) | Claim a half-open probe slot |
/// | [`release_probe`](BreakerStore::release_probe) | Return a probe slot |
/// | [`read_ramp`](BreakerStore::read_ramp) | Read the recovery ramp percentage |
/// | [`set_ramp`](BreakerStore::set_ramp) | Write the recovery ramp percentage with TTL |
///
/// # Example
///
/// ```
/// use switchgear_store::{BreakerStore, BreakerState, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
///
/// assert_eq!(store.read_latch("api").await.unwrap(), None);
/// store.set_latch("api", BreakerState::Open, None).await.unwrap();
/// assert_eq!(store.read_latch("api").await.unwrap(), Some(BreakerState::Open));
/// # });
/// ```
#[async_trait]
pub trait BreakerStore: Send + Sync {
    /// Counts one outcome in the bucket at `align(timestamp)`.
    ///
    /// Atomically increments the success or failure field of the bucket and
    /// sets or refreshes the bucket's TTL to `window + bucket`. Bucket
    /// counters only ever grow; they are never decremented.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn record(
        &self,
        key: &str,
        success: bool,
        timestamp: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<()>;

    /// Aggregates success and failure counts over the sliding window.
    ///
    /// Sums all buckets whose aligned epoch lies in
    /// `[align(now - window), align(now)]` inclusive. Missing buckets read
    /// as zero. The aggregation is best-effort atomic across buckets:
    /// readers tolerate buckets expiring mid-read.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_window(
        &self,
        key: &str,
        now: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<WindowCounts>;

    /// Reads the authoritative breaker state.
    ///
    /// Returns `None` when no latch is present, which callers interpret as
    /// [`BreakerState::Closed`].
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_latch(&self, key: &str) -> StoreResult<Option<BreakerState>>;

    /// Writes the breaker state, optionally with a TTL.
    ///
    /// Latch writes are last-writer-wins; concurrent transitions reconcile
    /// through the next read.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_latch(
        &self,
        key: &str,
        state: BreakerState,
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    /// Attempts to claim one of `max_probes` half-open probe slots.
    ///
    /// Atomically increments the probe counter; when the counter is fresh
    /// (`n == 1`) its TTL is set to `ttl`. When the incremented value
    /// exceeds `max_probes`, the increment is undone and `false` is
    /// returned. The counter is self-healing: its TTL eventually clears any
    /// stuck value.
    #[must_use = "the returned flag gates whether a probe may be sent"]
    async fn try_acquire_probe(
        &self,
        key: &str,
        max_probes: u32,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Returns a probe slot.
    ///
    /// Decrements the probe counter. The counter is allowed to go
    /// transiently negative without error; the TTL self-heals it.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn release_probe(&self, key: &str) -> StoreResult<()>;

    /// Reads the recovery ramp percentage.
    ///
    /// Returns `None` when no ramp is present, which callers interpret as
    /// full (100%) primary traffic.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn read_ramp(&self, key: &str) -> StoreResult<Option<u8>>;

    /// Writes the recovery ramp percentage with a TTL.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set_ramp(&self, key: &str, percent: u8, ttl: Duration) -> StoreResult<()>;
}
