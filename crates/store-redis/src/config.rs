//! Configuration for the Redis-backed store.

use std::time::Duration;

use switchgear_store::ConfigError;

/// Default maximum number of retry attempts for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff duration between retries.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default maximum backoff duration between retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Default timeout for read operations (latch, ramp and window reads).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for write operations (record, latch/ramp writes, probe
/// counter updates).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Retry policy for transient Redis failures.
///
/// Only reads and idempotent writes are retried; counter updates run at
/// most once so a retried increment can never double-count. Non-transient
/// errors are returned immediately without retry.
///
/// # Backoff Strategy
///
/// Each retry doubles the backoff duration, starting from
/// `initial_backoff`, up to `max_backoff`. Random jitter (0–50% of the
/// computed delay) is added to prevent thundering-herd effects.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub(crate) max_retries: u32,
    pub(crate) initial_backoff: Duration,
    pub(crate) max_backoff: Duration,
}

#[bon::bon]
impl RetryConfig {
    /// Creates a new retry configuration.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Self {
        Self { max_retries, initial_backoff, max_backoff }
    }

    /// Returns the maximum number of retry attempts.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the initial backoff duration.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Per-operation timeout configuration.
///
/// Timeouts bound the total wall-clock time of an operation including all
/// retry attempts and backoff sleeps, and surface as
/// [`StoreError::Timeout`](switchgear_store::StoreError::Timeout).
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
}

#[bon::bon]
impl TimeoutConfig {
    /// Creates a new timeout configuration.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_READ_TIMEOUT)] read_timeout: Duration,
        #[builder(default = DEFAULT_WRITE_TIMEOUT)] write_timeout: Duration,
    ) -> Self {
        Self { read_timeout, write_timeout }
    }

    /// Returns the timeout applied to read operations.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the timeout applied to write operations.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { read_timeout: DEFAULT_READ_TIMEOUT, write_timeout: DEFAULT_WRITE_TIMEOUT }
    }
}

/// Configuration for [`RedisStore`](crate::RedisStore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use switchgear_store_redis::{RedisStoreConfig, RetryConfig};
///
/// let config = RedisStoreConfig::builder()
///     .url("redis://127.0.0.1:6379")
///     .retry(RetryConfig::builder().max_retries(5).build())
///     .build()?;
/// # Ok::<(), switchgear_store::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    url: String,
    retry: RetryConfig,
    timeouts: TimeoutConfig,
}

#[bon::bon]
impl RedisStoreConfig {
    /// Creates a new store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `url` is empty. The URL itself is only
    /// validated when connecting.
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(default)] retry: RetryConfig,
        #[builder(default)] timeouts: TimeoutConfig,
    ) -> Result<Self, ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::Empty { field: "url" });
        }
        Ok(Self { url, retry, timeouts })
    }

    /// Returns the Redis connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the per-operation timeouts.
    #[must_use]
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }
}
