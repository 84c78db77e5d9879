//! Error and retry-policy types for the Autopress pipeline domain.
//!
//! [`GenerationError`] covers every failure mode of a generation-service call,
//! from the transport up to structural validation of the parsed content.
//! [`LifecycleError`] covers illegal state-machine transitions.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`]. The
//! orchestrator never inspects error variants directly to decide on a retry;
//! it asks the error for its policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ContentItemId, ItemStatus};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Rules:
/// - `Deferred`: the call never reached the service (rate-limit window still
///   active). Not an attempt failure; the item is left for the next sweep.
/// - `Retryable`: timeouts, transport failures, service rejections, and
///   malformed responses, retried up to the item's retry cap.
/// - `NonRetryable`: structurally incomplete source content; retrying cannot
///   fix the input, so the item fails terminally at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The call was blocked before it happened; defer to the next invocation
    /// without consuming a retry.
    Deferred {
        /// Remaining cooldown before the gate opens, if known.
        after: Option<Duration>,
    },
    /// The operation may be retried up to the configured cap.
    Retryable,
    /// The operation must not be retried; the item fails terminally.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Generation errors
// ---------------------------------------------------------------------------

/// Failure modes of one generation/correction round trip.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The shared cooldown window for the limiter key is still active.
    ///
    /// This is a deferral, not an attempt failure: no attempt is recorded and
    /// the retry count is untouched.
    #[error("rate limited; window open in {remaining:?}")]
    RateLimited {
        /// Time until the cooldown elapses.
        remaining: Duration,
    },

    /// The request never completed: connect failure, TLS failure, or timeout.
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable transport diagnosis.
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("service rejected request (status {status}): {message}")]
    ServiceRejected {
        /// HTTP status code returned by the service.
        status: u16,
        /// Error body or status reason.
        message: String,
    },

    /// The response arrived but the expected structure could not be parsed.
    ///
    /// The raw text is preserved so the failure record can be diagnosed.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// Why parsing failed.
        reason: String,
        /// The offending raw response text.
        raw: String,
    },

    /// The response parsed but the content does not meet minimum structural
    /// requirements (e.g. zero corrected records for a non-empty draft set).
    ///
    /// Terminal immediately: retrying will not fix a structurally incomplete
    /// source.
    #[error("validation failed: {reason}")]
    ValidationFailed {
        /// Which structural requirement was violated.
        reason: String,
    },
}

impl GenerationError {
    /// Maps this error to the retry decision the orchestrator should take.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { remaining } => RetryPolicy::Deferred {
                after: Some(*remaining),
            },
            Self::Transport { .. } | Self::ServiceRejected { .. } | Self::MalformedResponse { .. } => {
                RetryPolicy::Retryable
            }
            Self::ValidationFailed { .. } => RetryPolicy::NonRetryable,
        }
    }

    /// The string recorded in the item's failure attempt. Preserves the raw
    /// response text for malformed responses.
    pub fn attempt_record(&self) -> String {
        match self {
            Self::MalformedResponse { reason, raw } => format!("{reason}; raw: {raw}"),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle errors
// ---------------------------------------------------------------------------

/// An operation was attempted against an item in the wrong state.
#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    /// The requested transition is not an edge of the status machine.
    #[error("item {item}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Item the transition was attempted on.
        item: ContentItemId,
        /// Status the item is currently in.
        from: ItemStatus,
        /// Status that was requested.
        to: ItemStatus,
    },

    /// A retry was requested but the retry budget is exhausted.
    #[error("item {item}: retry budget exhausted ({retry_count}/{max_retries})")]
    RetriesExhausted {
        /// Item the retry was requested for.
        item: ContentItemId,
        /// Retries consumed so far.
        retry_count: u32,
        /// Configured cap.
        max_retries: u32,
    },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Failures of the persistence ports (item repository, lease store,
/// acquisition store). Produced by infrastructure adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage engine failed.
    #[error("storage failure: {message}")]
    Backend {
        /// Engine-specific diagnosis.
        message: String,
    },

    /// An optimistic status-guarded update found the row changed underneath us.
    ///
    /// Another process transitioned the item between our read and our write;
    /// the caller must re-select rather than overwrite.
    #[error("item {item}: status guard failed (expected {expected:?})")]
    GuardFailed {
        /// Item whose update was rejected.
        item: ContentItemId,
        /// Status we read at selection time.
        expected: ItemStatus,
    },

    /// No item with the given id exists.
    #[error("item {item}: not found")]
    NotFound {
        /// The missing id.
        item: ContentItemId,
    },

    /// A stored payload could not be decoded.
    #[error("corrupt record for item {item}: {message}")]
    Corrupt {
        /// Item whose row is unreadable.
        item: ContentItemId,
        /// Decoding diagnosis.
        message: String,
    },
}
