//! Shared test utilities for store and engine tests.
//!
//! Available with the `testutil` cargo feature (or within this crate's own
//! tests). Enable it in `[dev-dependencies]`:
//!
//! ```toml
//! switchgear-store = { version = "0.3", features = ["testutil"] }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::clock::Clock;

/// A manually driven clock for deterministic expiry tests.
///
/// All clones share the same instant, so a store and the test driving it can
/// hold separate handles.
///
/// # Example
///
/// ```
/// use switchgear_store::testutil::ManualClock;
/// use switchgear_store::Clock;
///
/// let clock = ManualClock::new(1_700_000_000);
/// clock.advance(30);
/// assert_eq!(clock.now_unix(), 1_700_000_030);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at the given Unix second.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute Unix second.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
