//! Per-job mutual exclusion.
//!
//! Each named job holds an exclusive, time-bounded lease for its own
//! duration; a second invocation of the same job while the lease is held
//! no-ops instead of running concurrently. This is a separate mechanism from
//! the rate limiter: the lease serializes *one job's* invocations, the
//! limiter serializes the external-service calls of *all* jobs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use pipeline::{Clock, JobName, LeaseStore, StoreError};

/// Result of an exclusive run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRun<T> {
    /// The lease was held and the job body ran to completion.
    Completed(T),
    /// Another invocation holds the lease; nothing was run.
    AlreadyRunning,
}

/// Runs `body` under the job's lease, or no-ops if the lease is held.
///
/// The lease is released afterwards; if this process dies mid-run the TTL
/// expires the claim on its own.
pub async fn run_exclusive<T, F, Fut>(
    leases: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    name: &JobName,
    ttl: Duration,
    body: F,
) -> Result<JobRun<T>, StoreError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let lease = match leases.acquire(name, ttl, clock.now())? {
        Some(lease) => lease,
        None => {
            info!(job = %name, "lease held by another invocation; skipping");
            return Ok(JobRun::AlreadyRunning);
        }
    };
    info!(job = %name, expires_at = %lease.expires_at, "lease acquired");

    let result = body().await;

    if let Err(e) = leases.release(&lease) {
        // Expiry will clean up; losing the release is not fatal.
        warn!(job = %name, error = %e, "lease release failed");
    }
    Ok(JobRun::Completed(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{Lease, SystemClock, Timestamp};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemLeases(Mutex<HashMap<String, Lease>>);

    impl LeaseStore for MemLeases {
        fn acquire(
            &self,
            name: &JobName,
            ttl: Duration,
            now: Timestamp,
        ) -> Result<Option<Lease>, StoreError> {
            let mut map = self.0.lock().unwrap();
            if let Some(existing) = map.get(name.as_str()) {
                if now < existing.expires_at {
                    return Ok(None);
                }
            }
            let lease = Lease {
                name: name.clone(),
                token: Uuid::new_v4(),
                expires_at: now.plus(ttl),
            };
            map.insert(name.as_str().to_owned(), lease.clone());
            Ok(Some(lease))
        }

        fn release(&self, lease: &Lease) -> Result<(), StoreError> {
            let mut map = self.0.lock().unwrap();
            if map.get(lease.name.as_str()).map(|l| l.token) == Some(lease.token) {
                map.remove(lease.name.as_str());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_invocation_noops_while_the_lease_is_held() {
        let leases: Arc<dyn LeaseStore> = Arc::new(MemLeases::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let job = JobName::new("correct-testimonials").unwrap();
        let ttl = Duration::from_secs(900);

        // Take the lease as if a first invocation were mid-run.
        let held = leases.acquire(&job, ttl, clock.now()).unwrap().unwrap();

        let run = run_exclusive(leases.clone(), clock.clone(), &job, ttl, || async { 42 })
            .await
            .unwrap();
        assert_eq!(run, JobRun::AlreadyRunning);

        // After release the job runs.
        leases.release(&held).unwrap();
        let run = run_exclusive(leases, clock, &job, ttl, || async { 42 })
            .await
            .unwrap();
        assert_eq!(run, JobRun::Completed(42));
    }

    #[tokio::test]
    async fn lease_is_released_after_the_body_finishes() {
        let leases: Arc<dyn LeaseStore> = Arc::new(MemLeases::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let job = JobName::new("generate-guides").unwrap();
        let ttl = Duration::from_secs(600);

        run_exclusive(leases.clone(), clock.clone(), &job, ttl, || async {})
            .await
            .unwrap();
        assert!(leases.acquire(&job, ttl, clock.now()).unwrap().is_some());
    }
}
