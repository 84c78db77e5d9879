//! Shared value types for the Autopress pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (costs are non-negative finite numbers,
//! timestamps are UTC) and participate in domain computations.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelId;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the duration elapsed from `earlier` to `self`, or zero if
    /// `earlier` is not actually earlier.
    pub fn since(self, earlier: Timestamp) -> std::time::Duration {
        (self.0 - earlier.0).to_std().unwrap_or_default()
    }

    /// Returns this timestamp shifted forward by `d`.
    pub fn plus(self, d: std::time::Duration) -> Self {
        Self(self.0 + ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::zero()))
    }

    /// Returns this timestamp shifted backward by `d`.
    pub fn minus(self, d: std::time::Duration) -> Self {
        Self(self.0 - ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::zero()))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// Monetary cost of one generation-service call, expressed in US dollars.
///
/// Used for per-attempt and per-item cost tracking. Arithmetic operations are
/// provided; callers are responsible for rounding to suitable display precision.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GenerationCost(f64);

impl GenerationCost {
    /// Creates a [`GenerationCost`] from a raw float value (USD).
    ///
    /// Returns `None` if `value` is negative, infinite, or NaN.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`GenerationCost`] of exactly zero.
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying `f64` value (USD).
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for GenerationCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.6}", self.0)
    }
}

impl std::ops::Add for GenerationCost {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for GenerationCost {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Outcome of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The service returned usable content and it was accepted.
    Success,
    /// The attempt failed; `error` on the [`Attempt`] carries the reason.
    Failure,
}

/// One entry in an item's append-only attempt history.
///
/// Attempts are never mutated retroactively; a new attempt is appended for
/// every call to the generation service that counts against the retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Model the attempt was issued against.
    pub model_used: ModelId,
    /// Whether the attempt succeeded.
    pub outcome: AttemptOutcome,
    /// Cost charged for the attempt.
    pub cost: GenerationCost,
    /// Failure description; `None` on success. For malformed responses this
    /// preserves the offending raw text for diagnosis.
    pub error: Option<String>,
    /// When the attempt completed.
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Generation options
// ---------------------------------------------------------------------------

/// Per-request options forwarded to the external generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier to request.
    pub model: ModelId,
    /// Maximum output size in tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature; correction runs pin this low for determinism.
    pub temperature: f64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GenerationOptions {
    /// Options used by the correction sweep: low temperature, 30 s timeout.
    pub fn correction(model: ModelId) -> Self {
        Self {
            model,
            max_output_tokens: 4096,
            temperature: 0.1,
            timeout_secs: 30,
        }
    }

    /// Options used when generating fresh content from an input brief: a
    /// larger output window and a longer timeout than a correction pass.
    pub fn generation(model: ModelId) -> Self {
        Self {
            model,
            max_output_tokens: 8192,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_rejects_non_finite_and_negative() {
        assert!(GenerationCost::new(-0.01).is_none());
        assert!(GenerationCost::new(f64::NAN).is_none());
        assert!(GenerationCost::new(f64::INFINITY).is_none());
        assert_eq!(GenerationCost::new(0.25).unwrap().as_f64(), 0.25);
    }

    #[test]
    fn timestamp_since_saturates_at_zero() {
        let earlier = Timestamp::now();
        let later = earlier.plus(std::time::Duration::from_secs(5));
        assert_eq!(later.since(earlier), std::time::Duration::from_secs(5));
        assert_eq!(earlier.since(later), std::time::Duration::ZERO);
    }
}
