//! Redis-backed implementation of [`BreakerStore`].

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use switchgear_store::{
    BreakerState, BreakerStore, StoreError, StoreResult, WindowCounts, align_epoch, bucket_ttl,
    ttl_seconds, window_epochs,
};

use crate::{
    config::{RedisStoreConfig, RetryConfig, TimeoutConfig},
    error::map_redis_err,
    keys,
    retry::{with_retry_timeout, with_timeout},
};

/// Redis-backed implementation of [`BreakerStore`].
///
/// All state lives under the `cb:{key}:*` namespace (see [`crate`] docs for
/// the normative layout), so any number of processes — in any language that
/// follows the same layout — share one logical breaker.
///
/// # Atomicity
///
/// - `record` runs `HINCRBY` + `EXPIRE` in one `MULTI`/`EXEC` transaction
/// - `read_window` issues a single pipelined batch of `HMGET`s
/// - the probe semaphore uses plain `INCR`/`DECR`, correcting over-claims
///   with a decrement; its TTL clears any stuck value
///
/// # Retries
///
/// Reads and idempotent writes (latch, ramp) are retried on transient
/// failures per the configured [`RetryConfig`]. Counter updates (`record`,
/// probe claims and releases) run at most once: retrying an increment after
/// an ambiguous failure could double-count. Every operation is bounded by
/// the configured [`TimeoutConfig`].
///
/// # Thread Safety
///
/// `RedisStore` is `Send + Sync` and cheap to clone; the underlying
/// connection manager multiplexes and reconnects automatically.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    retry: RetryConfig,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("retry", &self.retry).finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis and returns a ready store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the URL cannot be parsed or
    /// the initial connection fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use switchgear_store_redis::{RedisStore, RedisStoreConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RedisStoreConfig::builder().url("redis://127.0.0.1:6379").build()?;
    /// let store = RedisStore::connect(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|err| StoreError::connection_with("invalid Redis URL", err))?;
        let conn = client.get_connection_manager().await.map_err(map_redis_err)?;
        Ok(Self { conn, retry: config.retry().clone(), timeouts: config.timeouts().clone() })
    }
}

#[async_trait]
impl BreakerStore for RedisStore {
    async fn record(
        &self,
        key: &str,
        success: bool,
        timestamp: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<()> {
        let bucket_key = keys::bucket(key, align_epoch(timestamp, bucket));
        let field = if success { keys::FIELD_SUCCESSES } else { keys::FIELD_FAILURES };
        let ttl = ttl_seconds(bucket_ttl(window, bucket));
        let mut conn = self.conn.clone();

        with_timeout(self.timeouts.write_timeout(), async move {
            let _: () = redis::pipe()
                .atomic()
                .hincr(&bucket_key, field, 1i64)
                .ignore()
                .expire(&bucket_key, ttl as i64)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(map_redis_err)?;
            Ok(())
        })
        .await
    }

    async fn read_window(
        &self,
        key: &str,
        now: u64,
        window: Duration,
        bucket: Duration,
    ) -> StoreResult<WindowCounts> {
        let bucket_keys: Vec<String> =
            window_epochs(now, window, bucket).map(|epoch| keys::bucket(key, epoch)).collect();

        with_retry_timeout(&self.retry, self.timeouts.read_timeout(), "read_window", || {
            let mut conn = self.conn.clone();
            let bucket_keys = bucket_keys.clone();
            async move {
                let mut pipe = redis::pipe();
                for bucket_key in &bucket_keys {
                    pipe.cmd("HMGET")
                        .arg(bucket_key)
                        .arg(keys::FIELD_SUCCESSES)
                        .arg(keys::FIELD_FAILURES);
                }
                let rows: Vec<(Option<u64>, Option<u64>)> =
                    pipe.query_async(&mut conn).await.map_err(map_redis_err)?;

                let mut counts = WindowCounts::default();
                for (successes, failures) in rows {
                    counts.successes = counts.successes.saturating_add(successes.unwrap_or(0));
                    counts.failures = counts.failures.saturating_add(failures.unwrap_or(0));
                }
                Ok(counts)
            }
        })
        .await
    }

    async fn read_latch(&self, key: &str) -> StoreResult<Option<BreakerState>> {
        let latch_key = keys::latch(key);
        let raw: Option<String> =
            with_retry_timeout(&self.retry, self.timeouts.read_timeout(), "read_latch", || {
                let mut conn = self.conn.clone();
                let latch_key = latch_key.clone();
                async move { conn.get(&latch_key).await.map_err(map_redis_err) }
            })
            .await?;
        raw.map(|text| text.parse::<BreakerState>())
            .transpose()
            .map_err(|err| StoreError::serialization_with("latch holds an unknown state name", err))
    }

    async fn set_latch(
        &self,
        key: &str,
        state: BreakerState,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let latch_key = keys::latch(key);
        with_retry_timeout(&self.retry, self.timeouts.write_timeout(), "set_latch", || {
            let mut conn = self.conn.clone();
            let latch_key = latch_key.clone();
            async move {
                match ttl {
                    Some(ttl) => {
                        let _: () = conn
                            .set_ex(&latch_key, state.as_str(), ttl_seconds(ttl))
                            .await
                            .map_err(map_redis_err)?;
                    },
                    None => {
                        let _: () =
                            conn.set(&latch_key, state.as_str()).await.map_err(map_redis_err)?;
                    },
                }
                Ok(())
            }
        })
        .await
    }

    async fn try_acquire_probe(
        &self,
        key: &str,
        max_probes: u32,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let probe_key = keys::probes(key);
        let ttl = ttl_seconds(ttl);
        let mut conn = self.conn.clone();

        with_timeout(self.timeouts.write_timeout(), async move {
            let claimed: i64 = conn.incr(&probe_key, 1i64).await.map_err(map_redis_err)?;
            if claimed == 1 {
                if let Err(err) = conn.expire::<_, bool>(&probe_key, ttl as i64).await {
                    // Undo the claim: a counter without a TTL never heals.
                    let undo: Result<i64, redis::RedisError> = conn.decr(&probe_key, 1i64).await;
                    if let Err(undo_err) = undo {
                        tracing::warn!(
                            breaker = key,
                            error = %undo_err,
                            "failed to undo probe claim after EXPIRE failure",
                        );
                    }
                    return Err(map_redis_err(err));
                }
            }
            if claimed > i64::from(max_probes) {
                let undo: Result<i64, redis::RedisError> = conn.decr(&probe_key, 1i64).await;
                if let Err(err) = undo {
                    tracing::warn!(
                        breaker = key,
                        error = %err,
                        "failed to undo over-limit probe claim; TTL will self-heal",
                    );
                }
                return Ok(false);
            }
            Ok(true)
        })
        .await
    }

    async fn release_probe(&self, key: &str) -> StoreResult<()> {
        let probe_key = keys::probes(key);
        let mut conn = self.conn.clone();
        with_timeout(self.timeouts.write_timeout(), async move {
            let _: i64 = conn.decr(&probe_key, 1i64).await.map_err(map_redis_err)?;
            Ok(())
        })
        .await
    }

    async fn read_ramp(&self, key: &str) -> StoreResult<Option<u8>> {
        let ramp_key = keys::ramp(key);
        with_retry_timeout(&self.retry, self.timeouts.read_timeout(), "read_ramp", || {
            let mut conn = self.conn.clone();
            let ramp_key = ramp_key.clone();
            async move { conn.get(&ramp_key).await.map_err(map_redis_err) }
        })
        .await
    }

    async fn set_ramp(&self, key: &str, percent: u8, ttl: Duration) -> StoreResult<()> {
        let ramp_key = keys::ramp(key);
        with_retry_timeout(&self.retry, self.timeouts.write_timeout(), "set_ramp", || {
            let mut conn = self.conn.clone();
            let ramp_key = ramp_key.clone();
            async move {
                let _: () = conn
                    .set_ex(&ramp_key, percent, ttl_seconds(ttl))
                    .await
                    .map_err(map_redis_err)?;
                Ok(())
            }
        })
        .await
    }
}
