//! Store error types and result alias.
//!
//! This module defines the error types that can occur during breaker store
//! operations. All store implementations must map their internal errors to
//! these standardized error types.
//!
//! # Error Types
//!
//! - [`StoreError::Connection`] - Network or connection-related failures
//! - [`StoreError::Serialization`] - Value encoding/decoding failures
//! - [`StoreError::Timeout`] - Operation exceeded time limit
//! - [`StoreError::Internal`] - Store-specific internal errors
//! - [`ConfigError`] - Configuration value failed validation at construction time
//!
//! # Trace Context
//!
//! Each error variant carries an optional `span_id` captured from the active
//! [`tracing::Span`] at construction time. This enables end-to-end correlation
//! of errors with the decision or report that produced them.
//!
//! # Example
//!
//! ```
//! use switchgear_store::{StoreError, StoreResult};
//!
//! fn unreachable_store() -> StoreResult<()> {
//!     Err(StoreError::connection("connection refused"))
//! }
//! ```

use std::{fmt, sync::Arc};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for store operations.
///
/// All store operations return this type, providing consistent error handling
/// across different store implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned when a configuration value fails validation.
///
/// Each variant names the field that was invalid and the constraint it
/// violated, providing actionable feedback for operators constructing
/// configs.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field that must not be empty was empty.
    #[error("invalid {field}: must not be empty")]
    Empty {
        /// The name of the configuration field.
        field: &'static str,
    },

    /// A field that must be positive was set to zero or a zero-length duration.
    #[error("invalid {field}: must be positive (got {value})")]
    MustBePositive {
        /// The name of the configuration field.
        field: &'static str,
        /// A human-readable representation of the invalid value.
        value: String,
    },

    /// A minimum-bound constraint was violated.
    #[error("invalid {field}: must be >= {min} (got {value})")]
    BelowMinimum {
        /// The name of the configuration field.
        field: &'static str,
        /// The minimum allowed value (human-readable).
        min: String,
        /// The actual value provided (human-readable).
        value: String,
    },

    /// A maximum-bound constraint was violated.
    #[error("invalid {field}: must be <= {max} (got {value})")]
    AboveMaximum {
        /// The name of the configuration field.
        field: &'static str,
        /// The maximum allowed value (human-readable).
        max: String,
        /// The actual value provided (human-readable).
        value: String,
    },

    /// A value that must lie within an inclusive range fell outside it.
    #[error("invalid {field}: must be within {min}..={max} (got {value})")]
    OutOfRange {
        /// The name of the configuration field.
        field: &'static str,
        /// The lower bound of the valid range (human-readable).
        min: String,
        /// The upper bound of the valid range (human-readable).
        max: String,
        /// The actual value provided (human-readable).
        value: String,
    },

    /// A relational constraint between two fields was violated.
    #[error("invalid config: {field_a} ({value_a}) must be greater than {field_b} ({value_b})")]
    MustExceed {
        /// The field that should be the larger value.
        field_a: &'static str,
        /// The actual value of `field_a` (human-readable).
        value_a: String,
        /// The field that should be the smaller value.
        field_b: &'static str,
        /// The actual value of `field_b` (human-readable).
        value_b: String,
    },
}

/// Captures the span ID from the current tracing span, if any.
fn current_span_id() -> Option<tracing::span::Id> {
    tracing::Span::current().id()
}

/// Errors that can occur during breaker store operations.
///
/// This enum represents the canonical set of errors that any store
/// implementation can produce. Implementations should map their internal
/// error types to these variants.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// Each variant carries an optional `span_id` captured from the active
/// [`tracing::Span`] at error creation time. When present, the span ID is
/// included in the [`Display`] output for log correlation.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Connection or network error.
    ///
    /// This error indicates a failure to communicate with the backing
    /// key-value service, such as a network timeout, DNS failure, or
    /// connection refused.
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// Serialization or deserialization error.
    ///
    /// This error occurs when a stored value cannot be decoded — for
    /// example, a latch holding text that is not a valid state name, or a
    /// counter holding a non-integer.
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused decoding to fail.
        #[source]
        source: Option<BoxError>,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// Operation timed out.
    ///
    /// The store operation exceeded its configured time limit. This can
    /// occur during slow network conditions or store overload.
    Timeout {
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },

    /// Internal store error.
    ///
    /// This is a catch-all for store-specific errors that don't fit other
    /// categories.
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
        /// Span ID captured at error creation for trace correlation.
        span_id: Option<tracing::span::Id>,
    },
}

/// Appends ` [span=<id>]` to a formatter when a span ID is present.
fn fmt_span_suffix(f: &mut fmt::Formatter<'_>, span_id: &Option<tracing::span::Id>) -> fmt::Result {
    if let Some(id) = span_id { write!(f, " [span={}]", id.into_u64()) } else { Ok(()) }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { message, span_id, .. } => {
                write!(f, "Connection error: {message}")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Serialization { message, span_id, .. } => {
                write!(f, "Serialization error: {message}")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Timeout { span_id } => {
                write!(f, "Operation timeout")?;
                fmt_span_suffix(f, span_id)
            },
            Self::Internal { message, span_id, .. } => {
                write!(f, "Internal error: {message}")?;
                fmt_span_suffix(f, span_id)
            },
        }
    }
}

impl StoreError {
    /// Creates a new `Connection` error with the given message.
    ///
    /// Captures the current tracing span ID for log correlation.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None, span_id: current_span_id() }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Arc::new(source)),
            span_id: current_span_id(),
        }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None, span_id: current_span_id() }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Arc::new(source)),
            span_id: current_span_id(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout { span_id: current_span_id() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None, span_id: current_span_id() }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Arc::new(source)),
            span_id: current_span_id(),
        }
    }

    /// Returns `true` if the error is transient and the operation may
    /// succeed on retry (connection failures and timeouts).
    ///
    /// Serialization and internal errors are not transient: retrying
    /// without intervention will produce the same outcome.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}
