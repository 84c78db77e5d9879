//! Backlog ("stock") monitor.
//!
//! Alerts when the pool of generated-but-not-yet-published items falls below
//! a threshold, independent of per-item failures: a healthy pipeline keeps a
//! buffer of publishable content ready.

use std::sync::Arc;

use tracing::{info, warn};

use pipeline::{ContentItemRepository, StoreError};

/// Snapshot of the publishable-content pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogStatus {
    /// Generated or validated items not yet published.
    pub count: u64,
    /// Configured minimum.
    pub threshold: u64,
}

impl BacklogStatus {
    /// Whether the pool has drained below the threshold.
    pub fn is_low(&self) -> bool {
        self.count < self.threshold
    }
}

/// Measures the backlog and emits a warning event when it runs low.
pub fn check_backlog(
    repo: Arc<dyn ContentItemRepository>,
    threshold: u64,
) -> Result<BacklogStatus, StoreError> {
    let count = repo.count_unpublished()?;
    let status = BacklogStatus { count, threshold };
    if status.is_low() {
        warn!(count, threshold, "content backlog below threshold");
    } else {
        info!(count, threshold, "content backlog healthy");
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_is_strictly_below_threshold() {
        assert!(BacklogStatus { count: 4, threshold: 5 }.is_low());
        assert!(!BacklogStatus { count: 5, threshold: 5 }.is_low());
    }
}
