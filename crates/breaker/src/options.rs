//! Configuration for one breaker instance.
//!
//! Options are immutable and fully validated at construction — the engine
//! never raises a configuration error at runtime. Builders reject invalid
//! combinations with [`ConfigError`] naming the offending field.

use std::time::Duration;

use switchgear_store::ConfigError;

/// Default sliding observation window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default bucket granularity within the window.
pub const DEFAULT_BUCKET: Duration = Duration::from_secs(10);

/// Default minimum number of observations before the breaker can trip.
pub const DEFAULT_MIN_SAMPLES: u64 = 10;

/// Default failure fraction that trips the breaker from closed.
pub const DEFAULT_FAILURE_RATE_TO_OPEN: f64 = 0.5;

/// Default dwell time in the open state before probing starts.
pub const DEFAULT_OPEN_COOLDOWN: Duration = Duration::from_secs(30);

/// Default cap on concurrent half-open probes, cluster-wide.
pub const DEFAULT_HALF_OPEN_MAX_PROBES: u32 = 1;

/// Default number of consecutive probe successes required to close.
pub const DEFAULT_HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 3;

/// Default dwell per recovery ramp step.
pub const DEFAULT_RAMP_HOLD_DURATION: Duration = Duration::from_secs(30);

/// Default failure fraction that aborts a recovery ramp step.
pub const DEFAULT_RAMP_MAX_FAILURE_RATE: f64 = 0.5;

/// Upper bound on the observation window.
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum bucket granularity.
const MIN_BUCKET: Duration = Duration::from_secs(1);

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            min: "0.0".into(),
            max: "1.0".into(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Progressive recovery ramp configuration.
///
/// After the breaker closes, primary traffic is restored step by step
/// through the declared `percentages`, each step held for `hold_duration`
/// unless its failure rate exceeds `max_failure_rate_per_step` — which
/// re-opens the breaker.
#[derive(Debug, Clone)]
pub struct RampOptions {
    percentages: Vec<u8>,
    hold_duration: Duration,
    max_failure_rate_per_step: f64,
}

#[bon::bon]
impl RampOptions {
    /// Creates a new ramp configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `percentages` is empty or contains a value above 100
    /// - `hold_duration` is zero
    /// - `max_failure_rate_per_step` is outside `0.0..=1.0`
    #[builder]
    pub fn new(
        #[builder(default = vec![10, 25, 50, 100])] percentages: Vec<u8>,
        #[builder(default = DEFAULT_RAMP_HOLD_DURATION)] hold_duration: Duration,
        #[builder(default = DEFAULT_RAMP_MAX_FAILURE_RATE)] max_failure_rate_per_step: f64,
    ) -> Result<Self, ConfigError> {
        if percentages.is_empty() {
            return Err(ConfigError::Empty { field: "ramp.percentages" });
        }
        if let Some(bad) = percentages.iter().find(|&&p| p > 100) {
            return Err(ConfigError::OutOfRange {
                field: "ramp.percentages",
                min: "0".into(),
                max: "100".into(),
                value: bad.to_string(),
            });
        }
        if hold_duration.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "ramp.hold_duration",
                value: "0s".into(),
            });
        }
        check_fraction("ramp.max_failure_rate_per_step", max_failure_rate_per_step)?;
        Ok(Self { percentages, hold_duration, max_failure_rate_per_step })
    }

    /// Returns the ordered routing weights toward the primary, in percent.
    #[must_use]
    pub fn percentages(&self) -> &[u8] {
        &self.percentages
    }

    /// Returns the dwell per ramp step.
    #[must_use]
    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    /// Returns the failure fraction that aborts a ramp step.
    #[must_use]
    pub fn max_failure_rate_per_step(&self) -> f64 {
        self.max_failure_rate_per_step
    }
}

impl Default for RampOptions {
    fn default() -> Self {
        Self {
            percentages: vec![10, 25, 50, 100],
            hold_duration: DEFAULT_RAMP_HOLD_DURATION,
            max_failure_rate_per_step: DEFAULT_RAMP_MAX_FAILURE_RATE,
        }
    }
}

/// Immutable, validated configuration for one breaker instance.
///
/// Two engines sharing the same `key` (and store) are the same logical
/// breaker, so their options should match; the store carries no
/// configuration of its own.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use switchgear_breaker::BreakerOptions;
///
/// let opts = BreakerOptions::builder()
///     .key("checkout-api")
///     .window(Duration::from_secs(120))
///     .bucket(Duration::from_secs(10))
///     .failure_rate_to_open(0.25)
///     .build()?;
/// assert_eq!(opts.key(), "checkout-api");
/// # Ok::<(), switchgear_store::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    key: String,
    window: Duration,
    bucket: Duration,
    min_samples: u64,
    failure_rate_to_open: f64,
    open_cooldown: Duration,
    half_open_max_probes: u32,
    half_open_successes_to_close: u32,
    ramp: RampOptions,
}

#[bon::bon]
impl BreakerOptions {
    /// Creates a new breaker configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `key` is empty
    /// - `bucket` is below one second
    /// - `window` does not exceed `bucket`, or exceeds 24 hours
    /// - `min_samples`, `half_open_max_probes` or
    ///   `half_open_successes_to_close` is zero
    /// - `failure_rate_to_open` is outside `0.0..=1.0`
    /// - `open_cooldown` is zero
    #[builder]
    pub fn new(
        #[builder(into)] key: String,
        #[builder(default = DEFAULT_WINDOW)] window: Duration,
        #[builder(default = DEFAULT_BUCKET)] bucket: Duration,
        #[builder(default = DEFAULT_MIN_SAMPLES)] min_samples: u64,
        #[builder(default = DEFAULT_FAILURE_RATE_TO_OPEN)] failure_rate_to_open: f64,
        #[builder(default = DEFAULT_OPEN_COOLDOWN)] open_cooldown: Duration,
        #[builder(default = DEFAULT_HALF_OPEN_MAX_PROBES)] half_open_max_probes: u32,
        #[builder(default = DEFAULT_HALF_OPEN_SUCCESSES_TO_CLOSE)]
        half_open_successes_to_close: u32,
        #[builder(default)] ramp: RampOptions,
    ) -> Result<Self, ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::Empty { field: "key" });
        }
        if bucket < MIN_BUCKET {
            return Err(ConfigError::BelowMinimum {
                field: "bucket",
                min: "1s".into(),
                value: format!("{bucket:?}"),
            });
        }
        if window <= bucket {
            return Err(ConfigError::MustExceed {
                field_a: "window",
                value_a: format!("{window:?}"),
                field_b: "bucket",
                value_b: format!("{bucket:?}"),
            });
        }
        if window > MAX_WINDOW {
            return Err(ConfigError::AboveMaximum {
                field: "window",
                max: "24h".into(),
                value: format!("{window:?}"),
            });
        }
        if min_samples == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "min_samples",
                min: "1".into(),
                value: "0".into(),
            });
        }
        check_fraction("failure_rate_to_open", failure_rate_to_open)?;
        if open_cooldown.is_zero() {
            return Err(ConfigError::MustBePositive { field: "open_cooldown", value: "0s".into() });
        }
        if half_open_max_probes == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "half_open_max_probes",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if half_open_successes_to_close == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "half_open_successes_to_close",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(Self {
            key,
            window,
            bucket,
            min_samples,
            failure_rate_to_open,
            open_cooldown,
            half_open_max_probes,
            half_open_successes_to_close,
            ramp,
        })
    }

    /// Returns the breaker identity.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the sliding observation window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the bucket granularity.
    #[must_use]
    pub fn bucket(&self) -> Duration {
        self.bucket
    }

    /// Returns the minimum observations before the breaker can trip.
    #[must_use]
    pub fn min_samples(&self) -> u64 {
        self.min_samples
    }

    /// Returns the failure fraction that trips the breaker from closed.
    #[must_use]
    pub fn failure_rate_to_open(&self) -> f64 {
        self.failure_rate_to_open
    }

    /// Returns the dwell time in the open state before probing starts.
    #[must_use]
    pub fn open_cooldown(&self) -> Duration {
        self.open_cooldown
    }

    /// Returns the cluster-wide cap on concurrent half-open probes.
    #[must_use]
    pub fn half_open_max_probes(&self) -> u32 {
        self.half_open_max_probes
    }

    /// Returns the consecutive probe successes required to close.
    #[must_use]
    pub fn half_open_successes_to_close(&self) -> u32 {
        self.half_open_successes_to_close
    }

    /// Returns the recovery ramp configuration.
    #[must_use]
    pub fn ramp(&self) -> &RampOptions {
        &self.ramp
    }
}
