//! Shared-state backend for the sliding window event log.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// One provisional admission event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    /// Unique member identifier; the timestamp alone does not disambiguate
    /// concurrent same-millisecond events
    pub member: String,
    /// Event time in epoch milliseconds, used as the score
    pub timestamp_ms: i64,
}

impl WindowEvent {
    /// A fresh event at `timestamp_ms` with a random member identifier.
    pub fn at(timestamp_ms: i64) -> Self {
        Self {
            member: format!("{}-{}", Uuid::new_v4(), timestamp_ms),
            timestamp_ms,
        }
    }
}

/// Per-key ordered event log shared by every caller.
///
/// Implementations must apply [`append`](EventLog::append) as a single
/// atomic unit: concurrent callers for the same key never observe a count
/// reflecting a partially applied trim or insert.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Atomically drop every event with a score `<= window_start_ms`, insert
    /// `event`, set the log's expiration to `ttl` and return the number of
    /// events left in the window, `event` included.
    async fn append(
        &self,
        key: &str,
        event: &WindowEvent,
        window_start_ms: i64,
        ttl: Duration,
    ) -> Result<u64>;

    /// Remove a single event by member.
    async fn remove(&self, key: &str, member: &str) -> Result<()>;
}
