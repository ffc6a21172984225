//! Quota-based endpoint router.
//!
//! A simpler sibling of the circuit breaker that shares its store contract:
//! a single atomic counter with a TTL routes traffic to the secondary
//! endpoint once a per-period quota on the primary is exceeded. There is no
//! state machine and no report path — the counter resets itself when the
//! period's TTL expires.

use std::{sync::Arc, time::Duration};

use switchgear_store::{BreakerStore, ConfigError};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    engine::EndpointChoice,
    error::{BreakerError, BreakerResult},
    metrics::TELEMETRY_NAME,
};

/// Default number of primary requests allowed per period.
pub const DEFAULT_MAX_PER_PERIOD: u32 = 1_000;

/// Default quota period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Immutable, validated configuration for one quota router.
#[derive(Debug, Clone)]
pub struct QuotaOptions {
    key: String,
    max_per_period: u32,
    period: Duration,
}

#[bon::bon]
impl QuotaOptions {
    /// Creates a new quota configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `key` is empty, `max_per_period` is zero,
    /// or `period` is zero.
    #[builder]
    pub fn new(
        #[builder(into)] key: String,
        #[builder(default = DEFAULT_MAX_PER_PERIOD)] max_per_period: u32,
        #[builder(default = DEFAULT_PERIOD)] period: Duration,
    ) -> Result<Self, ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::Empty { field: "key" });
        }
        if max_per_period == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_per_period",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if period.is_zero() {
            return Err(ConfigError::MustBePositive { field: "period", value: "0s".into() });
        }
        Ok(Self { key, max_per_period, period })
    }

    /// Returns the quota identity.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the number of primary requests allowed per period.
    #[must_use]
    pub fn max_per_period(&self) -> u32 {
        self.max_per_period
    }

    /// Returns the quota period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Routes to the secondary endpoint once the primary's per-period quota is
/// spent.
///
/// All processes sharing the store and key draw from the same quota.
#[derive(Debug, Clone)]
pub struct QuotaBreaker<S> {
    opts: QuotaOptions,
    store: Arc<S>,
}

impl<S: BreakerStore> QuotaBreaker<S> {
    /// Creates a new quota router.
    #[must_use]
    pub fn new(options: QuotaOptions, store: Arc<S>) -> Self {
        Self { opts: options, store }
    }

    /// Picks the endpoint for one call: the primary while quota remains in
    /// the current period, the secondary after.
    ///
    /// # Errors
    ///
    /// Store errors and cancellation propagate; there is no safe default
    /// without the shared counter.
    pub async fn decide<E>(
        &self,
        primary: E,
        secondary: E,
        cancel: &CancellationToken,
    ) -> BreakerResult<EndpointChoice<E>> {
        let span =
            tracing::info_span!(target: TELEMETRY_NAME, "choose", breaker = %self.opts.key());
        async move {
            let within_quota = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BreakerError::Cancelled),
                result = self.store.try_acquire_probe(
                    self.opts.key(),
                    self.opts.max_per_period(),
                    self.opts.period(),
                ) => result.map_err(BreakerError::from)?,
            };
            if within_quota {
                Ok(EndpointChoice { endpoint: primary, is_probe: false, primary_weight_percent: 100 })
            } else {
                Ok(EndpointChoice { endpoint: secondary, is_probe: false, primary_weight_percent: 0 })
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use switchgear_store::{MemoryStore, testutil::ManualClock};

    use super::*;

    fn router(max: u32, period: Duration) -> (QuotaBreaker<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000);
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        let opts =
            QuotaOptions::builder().key("q").max_per_period(max).period(period).build().unwrap();
        (QuotaBreaker::new(opts, Arc::new(store)), clock)
    }

    #[tokio::test]
    async fn primary_until_quota_spent() {
        let (router, _clock) = router(2, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let choice = router.decide("p", "s", &cancel).await.unwrap();
            assert_eq!(choice.endpoint, "p");
            assert!(!choice.is_probe);
        }
        let choice = router.decide("p", "s", &cancel).await.unwrap();
        assert_eq!(choice.endpoint, "s");
        assert_eq!(choice.primary_weight_percent, 0);
    }

    #[tokio::test]
    async fn quota_resets_after_period() {
        let (router, clock) = router(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        assert_eq!(router.decide("p", "s", &cancel).await.unwrap().endpoint, "p");
        assert_eq!(router.decide("p", "s", &cancel).await.unwrap().endpoint, "s");

        clock.advance(61);
        assert_eq!(router.decide("p", "s", &cancel).await.unwrap().endpoint, "p");
    }

    #[tokio::test]
    async fn cancelled_decide_propagates() {
        let (router, _clock) = router(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = router.decide("p", "s", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn zero_quota_rejected() {
        assert!(QuotaOptions::builder().key("q").max_per_period(0).build().is_err());
        assert!(QuotaOptions::builder().key("q").period(Duration::ZERO).build().is_err());
        assert!(QuotaOptions::builder().key("").build().is_err());
    }
}
