//! Engine error types and result alias.

use switchgear_store::StoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type BreakerResult<T> = Result<T, BreakerError>;

/// Errors surfaced by the breaker engine.
///
/// Store failures propagate out of [`decide`](crate::Breaker::decide)
/// unchanged — without knowing the latched state there is no safe default
/// decision. Out of [`report`](crate::Breaker::report) they propagate only
/// when the mandatory outcome recording failed; errors from every later
/// bookkeeping write are logged and swallowed so cleanup problems never
/// cascade into the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BreakerError {
    /// A store operation failed.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The caller's cancellation signal fired before the operation
    /// completed. Partial effects are possible (an outcome may have been
    /// recorded without state evaluation); local state is never altered by
    /// cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl BreakerError {
    /// Returns `true` if this error came from the cancellation signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
