//! Breaker state as shared through the latch.
//!
//! Every process observing the same breaker key reads and writes the same
//! latch value, so the textual names are part of the wire contract:
//! `"Closed"`, `"Open"` and `"HalfOpen"` are normative for interoperating
//! engines. An absent latch is equivalent to [`BreakerState::Closed`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of one logical breaker.
///
/// # State Transitions
///
/// ```text
/// ┌────────┐  failure rate tripped  ┌──────┐     cooldown elapsed    ┌──────────┐
/// │ Closed │ ─────────────────────→ │ Open │ ──────────────────────→ │ HalfOpen │
/// └────────┘                        └──────┘ ←─────probe fails────── └──────────┘
///      ↑                                                                  │
///      └───────────────── consecutive probe successes ────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    /// Normal operation — traffic goes to the primary endpoint.
    #[default]
    Closed,
    /// The primary is assumed down — all traffic is diverted to the
    /// secondary endpoint.
    Open,
    /// A bounded number of probe requests test whether the primary has
    /// recovered.
    HalfOpen,
}

impl BreakerState {
    /// Returns the normative textual name stored in the latch.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Open => "Open",
            Self::HalfOpen => "HalfOpen",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when latch text does not name a known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown breaker state {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for BreakerState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Closed" => Ok(Self::Closed),
            "Open" => Ok(Self::Open),
            "HalfOpen" => Ok(Self::HalfOpen),
            other => Err(ParseStateError(other.to_owned())),
        }
    }
}
