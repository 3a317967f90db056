//! Sliding window rate checker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::backend::{EventLog, WindowEvent};
use super::clock::{Clock, SystemClock};
use super::options::Interval;

/// Makes the allow/deny decision for a single call.
#[async_trait]
pub trait RateChecker: Send + Sync {
    /// Returns `true` if a call for `key` may proceed under a quota of
    /// `max_requests` per `interval`.
    async fn check(&self, key: &str, max_requests: u64, interval: &Interval) -> bool;
}

/// Sliding window checker over a shared [`EventLog`].
///
/// Every check optimistically appends an event and counts the window in
/// one atomic step. If the count exceeds the quota the event is removed
/// again, so a denied call never leaves a trace. Backend failures deny.
pub struct SlidingWindowChecker {
    log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowChecker {
    /// Create a checker using the system clock.
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Remove a provisional event, logging rather than failing.
    async fn compensate(&self, key: &str, event: &WindowEvent) {
        if let Err(e) = self.log.remove(key, &event.member).await {
            warn!(
                key = %key,
                member = %event.member,
                error = %e,
                "Failed to remove denied window event"
            );
        }
    }
}

#[async_trait]
impl RateChecker for SlidingWindowChecker {
    async fn check(&self, key: &str, max_requests: u64, interval: &Interval) -> bool {
        let now = self.clock.now_millis();
        let length = i64::try_from(interval.to_millis()).unwrap_or(i64::MAX);
        let window_start = now.saturating_sub(length);
        let event = WindowEvent::at(now);

        trace!(
            key = %key,
            limit = max_requests,
            interval = %interval,
            "Checking rate limit"
        );

        match self
            .log
            .append(key, &event, window_start, interval.to_duration())
            .await
        {
            Ok(count) if count <= max_requests => {
                trace!(key = %key, count = count, "Call admitted");
                true
            }
            Ok(count) => {
                debug!(
                    key = %key,
                    count = count,
                    limit = max_requests,
                    "Rate limit exceeded"
                );
                self.compensate(key, &event).await;
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Event log failure, denying call");
                self.compensate(key, &event).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TurnstileError};
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::memory::InMemoryEventLog;
    use crate::ratelimit::options::TimeUnit;
    use futures::future::join_all;
    use parking_lot::Mutex;
    use std::time::Duration;

    const NOW: i64 = 1_448_037_976_717;

    fn seeded(offsets: impl IntoIterator<Item = i64>) -> Arc<InMemoryEventLog> {
        let log = Arc::new(InMemoryEventLog::new());
        for offset in offsets {
            log.insert("test", WindowEvent::at(NOW - offset));
        }
        log
    }

    fn checker(log: Arc<InMemoryEventLog>, clock: ManualClock) -> SlidingWindowChecker {
        SlidingWindowChecker::new(log).with_clock(Arc::new(clock))
    }

    fn seconds(amount: u64) -> Interval {
        Interval::new(amount, TimeUnit::Seconds).unwrap()
    }

    #[tokio::test]
    async fn test_allow() {
        let log = seeded((1..6).map(|i| i * 1_000));
        let checker = checker(log.clone(), ManualClock::new(NOW));

        assert!(checker.check("test", 10, &seconds(10)).await);
        assert_eq!(log.len("test"), 6);
    }

    #[tokio::test]
    async fn test_allow_then_deny() {
        let log = seeded((1..10).map(|i| i * 1_000));
        let checker = checker(log.clone(), ManualClock::new(NOW));

        assert!(checker.check("test", 10, &seconds(10)).await);
        assert!(!checker.check("test", 10, &seconds(10)).await);
        assert_eq!(log.len("test"), 10);
    }

    #[tokio::test]
    async fn test_deny_leaves_no_residue() {
        let log = seeded((1..11).map(|i| i * 1_000));
        let checker = checker(log.clone(), ManualClock::new(NOW));

        for _ in 0..3 {
            assert!(!checker.check("test", 10, &seconds(20)).await);
            assert_eq!(log.len("test"), 10);
        }
    }

    #[tokio::test]
    async fn test_deny_and_trim() {
        // 20 events spanning the last 19 seconds
        let log = seeded((0..20).map(|i| i * 1_000));
        let checker = checker(log.clone(), ManualClock::new(NOW));

        assert!(!checker.check("test", 10, &seconds(10)).await);
        assert_eq!(log.len("test"), 10);
    }

    #[tokio::test]
    async fn test_window_admits_exactly_max() {
        let log = Arc::new(InMemoryEventLog::new());
        let clock = ManualClock::new(NOW);
        let checker = checker(log.clone(), clock.clone());

        for _ in 0..5 {
            assert!(checker.check("test", 5, &seconds(1)).await);
            clock.advance(Duration::from_millis(10));
        }
        assert!(!checker.check("test", 5, &seconds(1)).await);
        assert_eq!(log.len("test"), 5);
    }

    #[tokio::test]
    async fn test_expired_events_do_not_count() {
        let log = Arc::new(InMemoryEventLog::new());
        let clock = ManualClock::new(NOW);
        let checker = checker(log.clone(), clock.clone());

        assert!(checker.check("test", 2, &seconds(10)).await);
        assert!(checker.check("test", 2, &seconds(10)).await);
        assert!(!checker.check("test", 2, &seconds(10)).await);

        clock.advance(Duration::from_secs(10));
        assert!(checker.check("test", 2, &seconds(10)).await);
        assert_eq!(log.len("test"), 1);
    }

    #[tokio::test]
    async fn test_longest_interval() {
        let log = Arc::new(InMemoryEventLog::new());
        let checker = checker(log.clone(), ManualClock::new(NOW));
        let longest = Interval::new(i64::MAX as u64 / 86_400_000, TimeUnit::Days).unwrap();

        assert!(checker.check("test", 1, &longest).await);
        assert!(!checker.check("test", 1, &longest).await);
        assert_eq!(log.len("test"), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let log = Arc::new(InMemoryEventLog::new());
        let checker = checker(log.clone(), ManualClock::new(NOW));

        assert!(checker.check("a", 1, &seconds(10)).await);
        assert!(!checker.check("a", 1, &seconds(10)).await);
        assert!(checker.check("b", 1, &seconds(10)).await);
    }

    #[tokio::test]
    async fn test_zero_quota_denies() {
        let log = Arc::new(InMemoryEventLog::new());
        let checker = checker(log.clone(), ManualClock::new(NOW));

        assert!(!checker.check("test", 0, &seconds(10)).await);
        assert_eq!(log.len("test"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_quota() {
        let log = Arc::new(InMemoryEventLog::new());
        let checker = Arc::new(checker(log.clone(), ManualClock::new(NOW)));

        let calls = (0..64).map(|_| {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check("test", 10, &seconds(60)).await })
        });
        let admitted = join_all(calls)
            .await
            .into_iter()
            .filter(|result| *result.as_ref().unwrap())
            .count();

        assert_eq!(admitted, 10);
        assert_eq!(log.len("test"), 10);
    }

    /// Log whose appends always fail, recording compensation attempts.
    #[derive(Default)]
    struct FailingLog {
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventLog for FailingLog {
        async fn append(
            &self,
            _key: &str,
            _event: &WindowEvent,
            _window_start_ms: i64,
            _ttl: Duration,
        ) -> Result<u64> {
            Err(TurnstileError::UnexpectedReply(
                "expected 4 replies, got 3".to_string(),
            ))
        }

        async fn remove(&self, _key: &str, member: &str) -> Result<()> {
            self.removed.lock().push(member.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fails_closed_on_backend_error() {
        let log = Arc::new(FailingLog::default());
        let checker = SlidingWindowChecker::new(log.clone());

        assert!(!checker.check("test", 10, &seconds(10)).await);
        assert_eq!(log.removed.lock().len(), 1);
    }
}
