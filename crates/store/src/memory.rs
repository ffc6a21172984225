//! In-memory store implementation.
//!
//! This module provides [`MemoryStore`], an in-memory implementation of
//! [`BreakerStore`] suitable for testing and single-process deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Clock-driven expiry**: All TTLs follow the injected [`Clock`], so
//!   tests advance time manually instead of sleeping
//! - **Cheap clones**: All clones share the same underlying state
//!
//! # Expiry Model
//!
//! Expired entries are never observable: every read checks the expiry
//! timestamp before returning, and writes prune dead entries for the touched
//! breaker key. There is no background sweeper — expiry must follow the
//! injected clock, and a wall-time sweeper could not.
//!
//! # Limitations
//!
//! - State is lost when the process exits
//! - Not distributed; two processes each get their own breaker state

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    clock::{Clock, SystemClock},
    error::StoreResult,
    state::BreakerState,
    store::BreakerStore,
    window::{WindowCounts, align_epoch, bucket_ttl, ttl_seconds, window_epochs},
};

/// One time-aligned bucket of success/failure counts.
#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    successes: u64,
    failures: u64,
    expires_at: u64,
}

/// A latch entry; `expires_at == None` means the latch never expires.
#[derive(Debug, Clone, Copy)]
struct LatchEntry {
    state: BreakerState,
    expires_at: Option<u64>,
}

/// A TTL'd integer counter. Mirrors the semantics of a counter key in a
/// remote KV service: a decrement of an absent counter creates it at `-1`
/// with no expiry.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expires_at: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct RampEntry {
    percent: u8,
    expires_at: u64,
}

/// In-memory implementation of [`BreakerStore`].
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the same
/// underlying state, so two engines holding clones behave like two processes
/// sharing one store.
#[derive(Clone)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    buckets: Arc<RwLock<HashMap<String, BTreeMap<u64, Bucket>>>>,
    latches: Arc<RwLock<HashMap<String, LatchEntry>>>,
    probes: Arc<RwLock<HashMap<String, CounterEntry>>>,
    ramps: Arc<RwLock<HashMap<String, RampEntry>>>,
}

impl MemoryStore {
    /// Creates a new in-memory store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a new in-memory store on the given clock.
    ///
    /// All bucket, latch, probe and ramp expiry follows this clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            buckets: Arc::new(RwLock::new(HashMap::new())),
            latches: Arc::new(RwLock::new(HashMap::new())),
            probes: Arc::new(RwLock::new(HashMap::new())),
            ramps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_unix()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("breakers", &self.buckets.read().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BreakerStore for MemoryStore {
    async fn record(
        &self,
        key: &str,
        success: bool,
        timestamp: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<()> {
        let now = self.now();
        let epoch = align_epoch(timestamp, bucket);
        let expires_at = now + ttl_seconds(bucket_ttl(window, bucket));

        let mut buckets = self.buckets.write();
        let per_key = buckets.entry(key.to_owned()).or_default();
        per_key.retain(|_, b| b.expires_at > now);

        let entry = per_key.entry(epoch).or_default();
        if success {
            entry.successes = entry.successes.saturating_add(1);
        } else {
            entry.failures = entry.failures.saturating_add(1);
        }
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn read_window(
        &self,
        key: &str,
        now: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<WindowCounts> {
        let wall = self.now();
        let buckets = self.buckets.read();
        let Some(per_key) = buckets.get(key) else {
            return Ok(WindowCounts::default());
        };

        let mut counts = WindowCounts::default();
        for epoch in window_epochs(now, window, bucket) {
            if let Some(b) = per_key.get(&epoch)
                && b.expires_at > wall
            {
                counts.successes = counts.successes.saturating_add(b.successes);
                counts.failures = counts.failures.saturating_add(b.failures);
            }
        }
        Ok(counts)
    }

    async fn read_latch(&self, key: &str) -> StoreResult<Option<BreakerState>> {
        let now = self.now();
        let latches = self.latches.read();
        Ok(latches.get(key).and_then(|entry| match entry.expires_at {
            Some(at) if at <= now => None,
            _ => Some(entry.state),
        }))
    }

    async fn set_latch(
        &self,
        key: &str,
        state: BreakerState,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let expires_at = ttl.map(|t| self.now() + ttl_seconds(t));
        self.latches.write().insert(key.to_owned(), LatchEntry { state, expires_at });
        Ok(())
    }

    async fn try_acquire_probe(
        &self,
        key: &str,
        max_probes: u32,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = self.now();
        let mut probes = self.probes.write();

        let entry = probes
            .entry(key.to_owned())
            .and_modify(|e| {
                // An expired counter is the same as an absent one.
                if matches!(e.expires_at, Some(at) if at <= now) {
                    e.value = 0;
                    e.expires_at = None;
                }
            })
            .or_insert(CounterEntry { value: 0, expires_at: None });

        entry.value += 1;
        if entry.value == 1 {
            entry.expires_at = Some(now + ttl_seconds(ttl));
        }
        if entry.value > i64::from(max_probes) {
            entry.value -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn release_probe(&self, key: &str) -> StoreResult<()> {
        let now = self.now();
        let mut probes = self.probes.write();
        let entry = probes
            .entry(key.to_owned())
            .and_modify(|e| {
                if matches!(e.expires_at, Some(at) if at <= now) {
                    e.value = 0;
                    e.expires_at = None;
                }
            })
            .or_insert(CounterEntry { value: 0, expires_at: None });
        entry.value -= 1;
        Ok(())
    }

    async fn read_ramp(&self, key: &str) -> StoreResult<Option<u8>> {
        let now = self.now();
        let ramps = self.ramps.read();
        Ok(ramps.get(key).and_then(|e| (e.expires_at > now).then_some(e.percent)))
    }

    async fn set_ramp(&self, key: &str, percent: u8, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.now() + ttl_seconds(ttl);
        self.ramps.write().insert(key.to_owned(), RampEntry { percent, expires_at });
        Ok(())
    }
}
