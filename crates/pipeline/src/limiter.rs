//! Cross-process cooldown gate for calls to the external generation service.
//!
//! Many independently scheduled jobs call the same external service; the
//! service is the scarce, globally shared resource, so the minimum interval
//! between calls is enforced across *all* processes sharing a [`LimiterKey`],
//! not per thread.
//!
//! State lives in an injected [`AcquisitionStore`] (a shared timestamp table)
//! rather than an unreleasable lock: a caller that crashes after acquiring
//! leaves nothing to unlock, only a timestamp that ages out naturally.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::{AcquisitionStore, Clock, LimiterKey, StoreError};

/// Default minimum interval between calls sharing one key.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// Result of a non-blocking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The window elapsed and a new acquisition timestamp was recorded.
    Allowed,
    /// The window is still open; `remaining` is the time left to wait.
    Cooldown {
        /// Time until the cooldown since the last acquisition elapses.
        remaining: Duration,
    },
}

/// Shared cooldown gate over an injected store and clock.
pub struct RateLimiter {
    store: Arc<dyn AcquisitionStore>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl RateLimiter {
    /// Builds a limiter with the default 120 s cooldown.
    pub fn new(store: Arc<dyn AcquisitionStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_cooldown(store, clock, DEFAULT_COOLDOWN)
    }

    /// Builds a limiter with an explicit cooldown window.
    pub fn with_cooldown(
        store: Arc<dyn AcquisitionStore>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self { store, clock, cooldown }
    }

    /// The configured cooldown window.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Attempts one acquisition without blocking.
    ///
    /// Compare-and-set against the previously read timestamp: when two
    /// callers race on the same open window, exactly one records its
    /// timestamp and the other re-reads and sees a fresh cooldown.
    pub fn try_acquire(&self, key: &LimiterKey) -> Result<Acquisition, StoreError> {
        loop {
            let now = self.clock.now();
            let prev = self.store.last_acquired(key)?;
            if let Some(last) = prev {
                let elapsed = now.since(last);
                if elapsed < self.cooldown {
                    return Ok(Acquisition::Cooldown {
                        remaining: self.cooldown - elapsed,
                    });
                }
            }
            if self.store.record(key, prev, now)? {
                debug!(key = %key, "rate limiter acquired");
                return Ok(Acquisition::Allowed);
            }
            // Lost the CAS race; loop to observe the winner's timestamp.
        }
    }

    /// Blocks (sleeping the task) until an acquisition succeeds.
    ///
    /// `extra_delay` is additive pacing on top of the cooldown (`--delay`):
    /// it is slept once before the first attempt.
    pub async fn acquire_blocking(
        &self,
        key: &LimiterKey,
        extra_delay: Duration,
    ) -> Result<(), StoreError> {
        if !extra_delay.is_zero() {
            tokio::time::sleep(extra_delay).await;
        }
        loop {
            match self.try_acquire(key)? {
                Acquisition::Allowed => return Ok(()),
                Acquisition::Cooldown { remaining } => {
                    debug!(key = %key, ?remaining, "rate limiter cooling down");
                    tokio::time::sleep(remaining).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Manually advanced clock.
    struct FakeClock(Mutex<Timestamp>);

    impl FakeClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Timestamp::now())))
        }

        fn advance(&self, d: Duration) {
            let mut t = self.0.lock().unwrap();
            *t = t.plus(d);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Timestamp {
            *self.0.lock().unwrap()
        }
    }

    /// In-memory CAS timestamp table.
    #[derive(Default)]
    struct MemStore(Mutex<HashMap<String, Timestamp>>);

    impl AcquisitionStore for MemStore {
        fn last_acquired(&self, key: &LimiterKey) -> Result<Option<Timestamp>, StoreError> {
            Ok(self.0.lock().unwrap().get(key.as_str()).copied())
        }

        fn record(
            &self,
            key: &LimiterKey,
            prev_seen: Option<Timestamp>,
            now: Timestamp,
        ) -> Result<bool, StoreError> {
            let mut map = self.0.lock().unwrap();
            if map.get(key.as_str()).copied() != prev_seen {
                return Ok(false);
            }
            map.insert(key.as_str().to_owned(), now);
            Ok(true)
        }
    }

    fn key() -> LimiterKey {
        LimiterKey::new("generation-service").unwrap()
    }

    #[test]
    fn acquisitions_are_separated_by_the_cooldown() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::with_cooldown(
            Arc::new(MemStore::default()),
            clock.clone(),
            Duration::from_secs(120),
        );

        assert_eq!(limiter.try_acquire(&key()).unwrap(), Acquisition::Allowed);

        // Immediately after, the window is open for the full cooldown.
        match limiter.try_acquire(&key()).unwrap() {
            Acquisition::Cooldown { remaining } => {
                assert_eq!(remaining, Duration::from_secs(120))
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        clock.advance(Duration::from_secs(119));
        assert!(matches!(
            limiter.try_acquire(&key()).unwrap(),
            Acquisition::Cooldown { .. }
        ));

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.try_acquire(&key()).unwrap(), Acquisition::Allowed);
    }

    #[test]
    fn concurrent_callers_cannot_both_pass_one_window() {
        // Simulate the race by pre-recording what a concurrent winner would
        // write: the CAS sees a moved timestamp and the second caller loses.
        let clock = FakeClock::new();
        let store = Arc::new(MemStore::default());
        let limiter = RateLimiter::with_cooldown(store.clone(), clock.clone(), Duration::from_secs(60));

        assert_eq!(limiter.try_acquire(&key()).unwrap(), Acquisition::Allowed);
        clock.advance(Duration::from_secs(60));

        // A racing process slips its acquisition in between our read and write.
        let stale = store.last_acquired(&key()).unwrap();
        assert!(store.record(&key(), stale, clock.now()).unwrap());

        // Our attempt now observes the winner's fresh window.
        assert!(matches!(
            limiter.try_acquire(&key()).unwrap(),
            Acquisition::Cooldown { .. }
        ));
    }

    #[test]
    fn keys_have_independent_windows() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::with_cooldown(
            Arc::new(MemStore::default()),
            clock,
            Duration::from_secs(120),
        );
        let other = LimiterKey::new("image-service").unwrap();

        assert_eq!(limiter.try_acquire(&key()).unwrap(), Acquisition::Allowed);
        assert_eq!(limiter.try_acquire(&other).unwrap(), Acquisition::Allowed);
    }
}
