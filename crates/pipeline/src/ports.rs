//! Port trait definitions.
//!
//! The pipeline crate defines *what* it needs; infrastructure crates define
//! *how* to supply it. The orchestrator is written entirely against these
//! traits, so tests can substitute in-memory fakes and never touch the network
//! or a wall clock.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    CategorySlug, ContentItem, ContentItemId, GenerationError, GenerationOptions, ItemStatus,
    JobName, LimiterKey, StoreError, Timestamp,
};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injectable time source. Production uses [`SystemClock`]; limiter and lease
/// tests use a manually advanced fake.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> Timestamp;
}

/// [`Clock`] backed by the real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ---------------------------------------------------------------------------
// Generation service
// ---------------------------------------------------------------------------

/// The instruction payload sent to the generation service.
///
/// Built deterministically by the prompt builder: same drafts and metadata in,
/// same prompt out, so a given correction request can always be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Full prompt text: instruction template plus serialized drafts.
    pub text: String,
}

impl Prompt {
    /// Wraps prepared prompt text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One round trip to the external generation service.
///
/// Implementations issue exactly one request with a bounded timeout and do
/// not retry internally; retry policy belongs to the orchestrator, which
/// distinguishes the failure classes via [`GenerationError::retry_policy`].
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Sends `prompt` and returns the raw response text.
    ///
    /// Fails with [`GenerationError::ServiceRejected`] on a non-success
    /// response and with [`GenerationError::MalformedResponse`] on empty
    /// content.
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// Item repository
// ---------------------------------------------------------------------------

/// Which items a batch selection may return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchFilter {
    /// Restrict to one category slug.
    pub category: Option<CategorySlug>,
    /// Restrict to retryable failures from a prior tier (`--only-failed-standard`).
    pub only_failed: bool,
    /// Also select `generated` items for re-processing (`--force`).
    pub include_generated: bool,
    /// Retry cap used to decide which failed items still qualify.
    pub max_retries: u32,
}

/// Persistence port for [`ContentItem`]s.
///
/// Mutation is read-modify-write with an optimistic status guard: the write
/// succeeds only if the stored status still matches the status read at
/// selection time, so two differently named jobs can never both transition
/// the same item.
pub trait ContentItemRepository: Send + Sync {
    /// Persists a new item.
    fn insert(&self, item: &ContentItem) -> Result<(), StoreError>;

    /// Loads one item by id.
    fn get(&self, id: ContentItemId) -> Result<Option<ContentItem>, StoreError>;

    /// Writes `item` back, but only if the stored status is still `expected`.
    ///
    /// Fails with [`StoreError::GuardFailed`] when another process got there
    /// first.
    fn update_guarded(&self, item: &ContentItem, expected: ItemStatus) -> Result<(), StoreError>;

    /// Items eligible for a sweep: `pending`, plus `failed` with retries
    /// remaining, ordered by creation time, bounded by `limit`.
    fn select_batch(&self, filter: &BatchFilter, limit: usize) -> Result<Vec<ContentItem>, StoreError>;

    /// Deletes terminal items created before `cutoff`. Returns the number
    /// removed.
    fn delete_terminal_older_than(
        &self,
        cutoff: Timestamp,
        max_retries: u32,
    ) -> Result<usize, StoreError>;

    /// Size of the backlog pool: generated-or-validated items not yet
    /// published. Feeds the stock monitor.
    fn count_unpublished(&self) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Leases and acquisitions
// ---------------------------------------------------------------------------

/// A time-bounded exclusive claim held by one process.
///
/// Expiry is by TTL, never by explicit unlock alone, so a crashed holder can
/// never wedge the gate: the next caller simply steals the expired row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Name the lease was taken under.
    pub name: JobName,
    /// Fencing token distinguishing this holder from a later steal.
    pub token: Uuid,
    /// Instant after which any caller may take the lease over.
    pub expires_at: Timestamp,
}

/// Cross-process mutual exclusion with TTL expiry.
///
/// Used with long TTLs by the per-job mutex. The rate limiter's
/// [`AcquisitionStore`] covers the short-horizon equivalent with its own keys.
pub trait LeaseStore: Send + Sync {
    /// Claims `name` for `ttl`, stealing an expired claim if one is left
    /// behind. Returns `None` while another holder's claim is live.
    fn acquire(
        &self,
        name: &JobName,
        ttl: Duration,
        now: Timestamp,
    ) -> Result<Option<Lease>, StoreError>;

    /// Releases a held lease. A lease that already expired or was stolen is
    /// released as a no-op.
    fn release(&self, lease: &Lease) -> Result<(), StoreError>;
}

/// Shared last-acquisition timestamps for the rate limiter.
///
/// `record` is a compare-and-set: it succeeds only if the stored timestamp
/// still equals `prev_seen`, which is what keeps two concurrent callers from
/// both passing the gate in the same window.
pub trait AcquisitionStore: Send + Sync {
    /// Timestamp of the last successful acquisition for `key`, if any.
    fn last_acquired(&self, key: &LimiterKey) -> Result<Option<Timestamp>, StoreError>;

    /// Atomically replaces `prev_seen` with `now` for `key`. Returns `false`
    /// when the stored value moved underneath the caller.
    fn record(
        &self,
        key: &LimiterKey,
        prev_seen: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<bool, StoreError>;
}
