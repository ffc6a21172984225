//! Injectable time source.
//!
//! All bucket alignment and expiry math runs on whole UTC seconds taken
//! from a [`Clock`]. Production code uses [`SystemClock`]; tests inject a
//! manual clock (see the `testutil` feature) to drive expiry
//! deterministically.

use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic source of the current instant in whole UTC seconds.
///
/// Skew between participants sharing a breaker must stay below the bucket
/// width; the window accounting tolerates up to one bucket of skew with
/// only temporary misattribution.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time as seconds since the Unix epoch.
    fn now_unix(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2023() {
        assert!(SystemClock.now_unix() > 1_672_531_200);
    }
}
