//! Redis-backed store for switchgear circuit breakers.
//!
//! This crate provides [`RedisStore`], a production implementation of the
//! [`BreakerStore`](switchgear_store::BreakerStore) contract on Redis (or
//! any service speaking its protocol with atomic `INCR`/`HINCRBY`, key
//! TTLs and pipelining). Every process pointing an engine at the same
//! Redis and breaker key participates in the same logical breaker.
//!
//! # Key Layout
//!
//! The layout is normative for interoperating engines:
//!
//! ```text
//! cb:{key}:b:{alignedEpoch}   hash with fields s, f ; ttl = window + bucket
//! cb:{key}:latch              string: "Closed" | "Open" | "HalfOpen"
//! cb:{key}:probes             integer
//! cb:{key}:ramp               integer 0..100
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use switchgear_store::{BreakerStore, BreakerState};
//! use switchgear_store_redis::{RedisStore, RedisStoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisStoreConfig::builder().url("redis://127.0.0.1:6379").build()?;
//!     let store = RedisStore::connect(config).await?;
//!
//!     let latch = store.read_latch("checkout-api").await?;
//!     assert_eq!(latch.unwrap_or_default(), BreakerState::Closed);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod keys;
mod retry;
mod store;

pub use config::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT, RedisStoreConfig, RetryConfig, TimeoutConfig,
};
pub use store::RedisStore;
