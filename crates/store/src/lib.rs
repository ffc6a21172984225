//! Shared store abstraction for switchgear circuit breakers.
//!
//! This crate provides the [`BreakerStore`] trait and related types that
//! let many independent processes coordinate one logical circuit breaker
//! through an external key-value store with atomic counters and expiring
//! keys.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Caller / Transport                      │
//! │            (HTTP clients, policy adapters, ...)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   switchgear-breaker                        │
//! │       Breaker engine (decide/report state machine)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   switchgear-store                          │
//! │                   BreakerStore trait                        │
//! │   (buckets, latch, probe semaphore, recovery ramp)          │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryStore  │              RedisStore                      │
//! │  (testing)   │    (production, switchgear-store-redis)      │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use switchgear_store::{BreakerState, BreakerStore, MemoryStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!
//!     // Record an outcome and read the window back
//!     store.record("api", true, 1_700_000_000, Duration::from_secs(60), Duration::from_secs(10)).await?;
//!     let counts = store.read_window("api", 1_700_000_000, Duration::from_secs(60), Duration::from_secs(10)).await?;
//!     assert_eq!(counts.successes, 1);
//!
//!     // Latch the breaker open for 30 seconds
//!     store.set_latch("api", BreakerState::Open, Some(Duration::from_secs(30))).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Store
//!
//! To implement a new store:
//!
//! 1. Implement the [`BreakerStore`] trait
//! 2. Map backend-specific errors to [`StoreError`]
//! 3. Run the [`conformance`] suite against it (feature `testutil`)
//!
//! See the [`memory`] module source for a reference implementation.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module ([`ManualClock`](testutil::ManualClock))
//!   and the [`conformance`] suite. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod error;
pub mod memory;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod window;

// Re-export primary types at crate root for convenience
pub use clock::{Clock, SystemClock};
pub use error::{BoxError, ConfigError, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use state::{BreakerState, ParseStateError};
pub use store::BreakerStore;
pub use window::{WindowCounts, align_epoch, bucket_ttl, ttl_seconds, window_epochs};
