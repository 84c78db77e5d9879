//! Batch orchestration for the Autopress pipeline.
//!
//! Sequences the corrector's pure functions around the generation-service
//! call, persists every lifecycle transition through the repository's status
//! guard, and wraps whole jobs in per-name leases.
//!
//! ## Architectural Layer
//!
//! **Orchestration.** No domain rules of its own and no transport details:
//! everything happens through the [`pipeline`] port traits.

pub mod backlog;
pub mod orchestrator;
pub mod runner;

pub use backlog::{check_backlog, BacklogStatus};
pub use orchestrator::{
    BatchSummary, Orchestrator, OrchestratorConfig, OrchestratorError, ProcessOutcome,
};
pub use runner::{run_exclusive, JobRun};
