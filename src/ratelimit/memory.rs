//! In-process event log.
//!
//! Gives the sliding window semantics of the Redis log to a single process.
//! Each key's window sits behind its own shard lock, which makes `append`
//! atomic with respect to other callers for the same key. Windows past their
//! expiration are evicted by a sweep that runs at most once per
//! [`SWEEP_INTERVAL_MS`] of event time.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::backend::{EventLog, WindowEvent};
use crate::error::Result;

/// Minimum event-time gap between two sweeps of expired windows.
pub const SWEEP_INTERVAL_MS: i64 = 1_000;

#[derive(Debug, Default)]
struct Window {
    /// (score, member), ordered by event time
    events: BTreeSet<(i64, String)>,
    expires_at_ms: Option<i64>,
}

impl Window {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    fn expire(&mut self, now_ms: i64) {
        if self.is_expired(now_ms) {
            self.events.clear();
            self.expires_at_ms = None;
        }
    }
}

/// Event log kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    windows: DashMap<String, Window>,
    next_sweep_ms: AtomicI64,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event without trimming or touching the expiration.
    pub fn insert(&self, key: &str, event: WindowEvent) {
        self.windows
            .entry(key.to_string())
            .or_default()
            .events
            .insert((event.timestamp_ms, event.member));
    }

    /// Number of events currently stored for `key`.
    pub fn len(&self, key: &str) -> usize {
        self.windows.get(key).map_or(0, |window| window.events.len())
    }

    /// Number of keys with a stored window.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Drop every window expired at `now_ms`, returning how many were dropped.
    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now_ms));
        before.saturating_sub(self.windows.len())
    }

    /// Sweep unless another caller swept within the last interval.
    fn maybe_sweep(&self, now_ms: i64) {
        let due = self.next_sweep_ms.load(Ordering::Relaxed);
        if now_ms < due {
            return;
        }
        let next = now_ms.saturating_add(SWEEP_INTERVAL_MS);
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let evicted = self.evict_expired(now_ms);
            if evicted > 0 {
                trace!(evicted = evicted, "Evicted expired windows");
            }
        }
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        key: &str,
        event: &WindowEvent,
        window_start_ms: i64,
        ttl: Duration,
    ) -> Result<u64> {
        // must run before the entry guard below is taken
        self.maybe_sweep(event.timestamp_ms);

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut window = self.windows.entry(key.to_string()).or_default();

        window.expire(event.timestamp_ms);
        window
            .events
            .retain(|(score, _)| *score > window_start_ms);
        window
            .events
            .insert((event.timestamp_ms, event.member.clone()));
        window.expires_at_ms = Some(event.timestamp_ms.saturating_add(ttl_ms));

        Ok(window.events.len() as u64)
    }

    async fn remove(&self, key: &str, member: &str) -> Result<()> {
        if let Some(mut window) = self.windows.get_mut(key) {
            window.events.retain(|(_, m)| m != member);
        }
        self.windows.remove_if(key, |_, window| window.events.is_empty());
        Ok(())
    }
}
