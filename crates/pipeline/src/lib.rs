//! Core domain for the Autopress content pipeline.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, the [`ContentItem`] lifecycle state machine, the cross-process
//! [`RateLimiter`], and the port traits the infrastructure crates implement.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate touches neither the
//! network nor the store; it defines *what* is needed and infrastructure
//! crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`ContentItemId`, `JobName`, etc.) |
//! | [`types`] | Shared value types (`Timestamp`, `GenerationCost`, `Attempt`, etc.) |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`item`] | `ContentItem` entity and its status machine |
//! | [`block`] | `ContentBlock` / `BlockKind` document sub-elements |
//! | [`limiter`] | Cross-process rate limiter over an injected store and clock |
//! | [`ports`] | Port traits (`GenerationProvider`, repositories, leases, clock) |

pub mod block;
pub mod errors;
pub mod identifiers;
pub mod item;
pub mod limiter;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use block::{BlockKind, ContentBlock};
pub use errors::{GenerationError, LifecycleError, RetryPolicy, StoreError};
pub use identifiers::{
    BlockId, CategorySlug, ContentItemId, JobName, LimiterKey, ModelId, PublishedReference,
};
pub use item::{ContentItem, ItemStatus, DEFAULT_MAX_RETRIES};
pub use limiter::{Acquisition, RateLimiter, DEFAULT_COOLDOWN};
pub use ports::{
    AcquisitionStore, BatchFilter, Clock, ContentItemRepository, GenerationProvider, Lease,
    LeaseStore, Prompt, SystemClock,
};
pub use types::{Attempt, AttemptOutcome, GenerationCost, GenerationOptions, Timestamp};
