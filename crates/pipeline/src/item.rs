//! The [`ContentItem`] entity and its lifecycle state machine.
//!
//! An item is one tracked unit of generation or correction work. Its status
//! moves only along the edges below; every other edge is a
//! [`LifecycleError::IllegalTransition`]:
//!
//! ```text
//! pending    -> generating
//! retrying   -> generating
//! generating -> generated | failed
//! generated  -> validated
//! generated  -> generating    (forced re-processing only)
//! validated  -> published
//! failed     -> retrying      (only while retry_count < max_retries)
//! ```
//!
//! All mutation goes through the methods on [`ContentItem`]; the orchestrator
//! never pokes fields directly. The attempt history is append-only and
//! `retry_count` is monotonically non-decreasing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Attempt, AttemptOutcome, ContentItemId, GenerationCost, LifecycleError, ModelId,
    PublishedReference, Timestamp,
};

/// Default retry cap applied when no override is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle status of a [`ContentItem`]. Exactly one active state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Created by the selection step; waiting for a sweep to pick it up.
    Pending,
    /// A sweep holds the item and is calling the generation service.
    Generating,
    /// The service produced content that parsed and passed structural checks.
    Generated,
    /// A reviewer (or automated check) accepted the generated payload.
    Validated,
    /// Promoted to the public content store.
    Published,
    /// The last attempt failed. Terminal once the retry budget is exhausted.
    Failed,
    /// Queued for another attempt after a failure.
    Retrying,
}

impl ItemStatus {
    /// String form used by the persisted schema and scope queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::Validated => "validated",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "generating" => Self::Generating,
            "generated" => Self::Generated,
            "validated" => Self::Validated,
            "published" => Self::Published,
            "failed" => Self::Failed,
            "retrying" => Self::Retrying,
            _ => return None,
        })
    }
}

/// One persisted unit of generation/correction work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Opaque identity, stable for the item's whole life.
    pub id: ContentItemId,
    /// Current lifecycle status.
    pub status: ItemStatus,
    /// The content document being corrected, or the input brief for the
    /// generation flow. Immutable once the item is created.
    pub source_payload: Value,
    /// The structured content produced or corrected. Present only in
    /// `Generated`, `Validated`, and `Published`.
    pub generated_payload: Option<Value>,
    /// Append-only history of generation attempts.
    pub attempts: Vec<Attempt>,
    /// Failures counted against the retry budget. Never decreases.
    pub retry_count: u32,
    /// Model used by the most recent attempt.
    pub model_used: Option<ModelId>,
    /// Accumulated cost across all attempts.
    pub cost: GenerationCost,
    /// Optional category restriction tag carried from selection.
    pub category: Option<crate::CategorySlug>,
    pub created_at: Timestamp,
    pub generation_started_at: Option<Timestamp>,
    pub generated_at: Option<Timestamp>,
    pub validated_at: Option<Timestamp>,
    pub published_at: Option<Timestamp>,
    /// Public content store reference; set exactly once at publish.
    pub published_reference: Option<PublishedReference>,
    /// Updated on every attempt, unlike the other timestamps.
    pub last_attempt_at: Option<Timestamp>,
    /// Description of the most recent failure, if any.
    pub error: Option<String>,
}

impl ContentItem {
    /// Creates a fresh `Pending` item around an immutable source payload.
    pub fn new(source_payload: Value, category: Option<crate::CategorySlug>, now: Timestamp) -> Self {
        Self {
            id: ContentItemId::new_random(),
            status: ItemStatus::Pending,
            source_payload,
            generated_payload: None,
            attempts: Vec::new(),
            retry_count: 0,
            model_used: None,
            cost: GenerationCost::zero(),
            category,
            created_at: now,
            generation_started_at: None,
            generated_at: None,
            validated_at: None,
            published_at: None,
            published_reference: None,
            last_attempt_at: None,
            error: None,
        }
    }

    fn illegal(&self, to: ItemStatus) -> LifecycleError {
        LifecycleError::IllegalTransition {
            item: self.id,
            from: self.status,
            to,
        }
    }

    /// `pending | retrying -> generating`. Records the start time on the
    /// first entry only.
    pub fn begin_generation(&mut self, now: Timestamp) -> Result<(), LifecycleError> {
        match self.status {
            ItemStatus::Pending | ItemStatus::Retrying => {
                self.status = ItemStatus::Generating;
                self.generation_started_at.get_or_insert(now);
                Ok(())
            }
            _ => Err(self.illegal(ItemStatus::Generating)),
        }
    }

    /// `generated -> generating`: re-enters generation on an operator-forced
    /// sweep. The previous payload stays in place until a new success
    /// overwrites it.
    pub fn begin_regeneration(&mut self, now: Timestamp) -> Result<(), LifecycleError> {
        if self.status != ItemStatus::Generated {
            return Err(self.illegal(ItemStatus::Generating));
        }
        self.status = ItemStatus::Generating;
        self.generation_started_at.get_or_insert(now);
        Ok(())
    }

    /// Reverts a deferred item (`generating -> prior`) without recording an
    /// attempt. Used when the rate-limit window was still active: the call
    /// never happened, so the retry budget is untouched.
    pub fn defer(&mut self, prior: ItemStatus) -> Result<(), LifecycleError> {
        match (self.status, prior) {
            (
                ItemStatus::Generating,
                ItemStatus::Pending | ItemStatus::Retrying | ItemStatus::Generated,
            ) => {
                self.status = prior;
                Ok(())
            }
            _ => Err(self.illegal(prior)),
        }
    }

    /// `generating -> generated`: stores the payload and appends a success
    /// attempt.
    pub fn complete_generation(
        &mut self,
        payload: Value,
        model: ModelId,
        cost: GenerationCost,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        if self.status != ItemStatus::Generating {
            return Err(self.illegal(ItemStatus::Generated));
        }
        self.status = ItemStatus::Generated;
        self.generated_payload = Some(payload);
        self.generated_at.get_or_insert(now);
        self.last_attempt_at = Some(now);
        self.cost += cost;
        self.error = None;
        self.attempts.push(Attempt {
            model_used: model.clone(),
            outcome: AttemptOutcome::Success,
            cost,
            error: None,
            timestamp: now,
        });
        self.model_used = Some(model);
        Ok(())
    }

    /// `generating -> failed`: appends a failure attempt and consumes one
    /// retry from the budget.
    pub fn fail(
        &mut self,
        error: String,
        model: ModelId,
        cost: GenerationCost,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        if self.status != ItemStatus::Generating {
            return Err(self.illegal(ItemStatus::Failed));
        }
        self.status = ItemStatus::Failed;
        self.retry_count += 1;
        self.last_attempt_at = Some(now);
        self.cost += cost;
        self.error = Some(error.clone());
        self.attempts.push(Attempt {
            model_used: model.clone(),
            outcome: AttemptOutcome::Failure,
            cost,
            error: Some(error),
            timestamp: now,
        });
        self.model_used = Some(model);
        Ok(())
    }

    /// `generating -> failed` with the retry budget exhausted in one step.
    ///
    /// Used for validation failures, where retrying cannot fix a structurally
    /// incomplete source.
    pub fn fail_terminally(
        &mut self,
        error: String,
        model: ModelId,
        max_retries: u32,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        self.fail(error, model, GenerationCost::zero(), now)?;
        self.retry_count = self.retry_count.max(max_retries);
        Ok(())
    }

    /// `failed -> retrying`, permitted only while the retry budget holds.
    pub fn begin_retry(&mut self, max_retries: u32) -> Result<(), LifecycleError> {
        if self.status != ItemStatus::Failed {
            return Err(self.illegal(ItemStatus::Retrying));
        }
        if self.retry_count >= max_retries {
            return Err(LifecycleError::RetriesExhausted {
                item: self.id,
                retry_count: self.retry_count,
                max_retries,
            });
        }
        self.status = ItemStatus::Retrying;
        Ok(())
    }

    /// `generated -> validated`.
    pub fn validate(&mut self, now: Timestamp) -> Result<(), LifecycleError> {
        if self.status != ItemStatus::Generated {
            return Err(self.illegal(ItemStatus::Validated));
        }
        self.status = ItemStatus::Validated;
        self.validated_at.get_or_insert(now);
        Ok(())
    }

    /// `validated -> published`. Sets the published reference exactly once.
    ///
    /// Idempotent on an already-published item: the stored reference is kept
    /// and returned, and no field changes.
    pub fn publish(
        &mut self,
        reference: PublishedReference,
        now: Timestamp,
    ) -> Result<PublishedReference, LifecycleError> {
        match self.status {
            ItemStatus::Published => Ok(self
                .published_reference
                .clone()
                .unwrap_or(reference)),
            ItemStatus::Validated => {
                self.status = ItemStatus::Published;
                self.published_at.get_or_insert(now);
                self.published_reference = Some(reference.clone());
                Ok(reference)
            }
            _ => Err(self.illegal(ItemStatus::Published)),
        }
    }

    /// Whether the item may still re-enter generation automatically.
    pub fn has_retries_remaining(&self, max_retries: u32) -> bool {
        self.status == ItemStatus::Failed && self.retry_count < max_retries
    }

    /// Terminal items never transition again without operator intervention.
    pub fn is_terminal(&self, max_retries: u32) -> bool {
        match self.status {
            ItemStatus::Published => true,
            ItemStatus::Failed => self.retry_count >= max_retries,
            _ => false,
        }
    }
}
