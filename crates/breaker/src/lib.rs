//! Distributed circuit breaker engine for switchgear.
//!
//! A named breaker protects calls to a primary endpoint across many
//! independent processes. While the primary is healthy all traffic goes
//! there; while it is unhealthy traffic is diverted to a secondary
//! endpoint; after recovery, primary traffic is restored progressively.
//! Every process observing the same breaker key through the same store
//! reaches the same decisions within one decision of synchronization lag.
//!
//! # Protocol
//!
//! Callers bracket each protected call with two operations:
//!
//! ```text
//! let choice = breaker.decide(primary, secondary, &cancel).await?;
//! let outcome = call(choice.endpoint).await;       // caller's I/O
//! breaker.report(outcome.is_ok(), choice.is_probe, &cancel).await?;
//! ```
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  failure rate ≥ threshold  ┌──────┐   cooldown elapsed   ┌──────────┐
//! │ Closed │ ─────────────────────────→ │ Open │ ───────────────────→ │ HalfOpen │
//! └────────┘   (with enough samples)    └──────┘ ←───probe fails───── └──────────┘
//!      ↑                                                                   │
//!      └────── consecutive probe successes (then ramp: 10→25→50→100%) ─────┘
//! ```
//!
//! All durable state — sliding-window counters, the state latch, the probe
//! semaphore and the recovery ramp — lives in a
//! [`BreakerStore`](switchgear_store::BreakerStore). Use
//! [`MemoryStore`](switchgear_store::MemoryStore) for tests and
//! single-process deployments, or `switchgear-store-redis` to share one
//! breaker across a fleet.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use switchgear_breaker::{Breaker, BreakerOptions};
//! use switchgear_store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = BreakerOptions::builder()
//!         .key("checkout-api")
//!         .min_samples(5)
//!         .failure_rate_to_open(0.5)
//!         .build()?;
//!     let breaker = Breaker::new(opts, Arc::new(MemoryStore::new()));
//!     let cancel = CancellationToken::new();
//!
//!     let choice = breaker.decide("https://primary", "https://fallback", &cancel).await?;
//!     breaker.report(true, choice.is_probe, &cancel).await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod metrics;
mod options;
mod quota;

pub use engine::{Breaker, EndpointChoice};
pub use error::{BreakerError, BreakerResult};
pub use metrics::{BreakerMetrics, MetricsSnapshot, TELEMETRY_NAME};
pub use options::{
    BreakerOptions, DEFAULT_BUCKET, DEFAULT_FAILURE_RATE_TO_OPEN, DEFAULT_HALF_OPEN_MAX_PROBES,
    DEFAULT_HALF_OPEN_SUCCESSES_TO_CLOSE, DEFAULT_MIN_SAMPLES, DEFAULT_OPEN_COOLDOWN,
    DEFAULT_RAMP_HOLD_DURATION, DEFAULT_RAMP_MAX_FAILURE_RATE, DEFAULT_WINDOW, RampOptions,
};
pub use quota::{DEFAULT_MAX_PER_PERIOD, DEFAULT_PERIOD, QuotaBreaker, QuotaOptions};
// Re-export the store types callers need to construct an engine
pub use switchgear_store::{BreakerState, BreakerStore, Clock, MemoryStore, StoreError, SystemClock};
