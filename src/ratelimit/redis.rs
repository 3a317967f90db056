//! Redis-backed event log.
//!
//! Each key's window is a sorted set scored by event time. An append is a
//! single `MULTI`/`EXEC` transaction:
//!
//! ```text
//! ZREMRANGEBYSCORE key -inf <window_start>
//! ZADD             key <now> <member>
//! PEXPIRE          key <ttl>
//! ZCOUNT           key (<window_start> +inf
//! ```
//!
//! so every caller sharing the Redis instance observes a consistent count.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Value};
use tracing::trace;

use super::backend::{EventLog, WindowEvent};
use crate::error::{Result, TurnstileError};

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "turnstile:";

/// Number of replies an append transaction yields.
const APPEND_REPLIES: usize = 4;

/// Event log stored in Redis sorted sets.
#[derive(Clone)]
pub struct RedisEventLog {
    connection: ConnectionManager,
    key_prefix: String,
}

impl fmt::Debug for RedisEventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisEventLog")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisEventLog {
    /// Connect to Redis with the default key prefix.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self::new(connection))
    }

    /// Wrap an existing connection manager.
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Redis key holding the window for `key`.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

/// Pull the window count out of the `EXEC` replies.
fn window_count(replies: &[Value]) -> Result<u64> {
    if replies.len() != APPEND_REPLIES {
        return Err(TurnstileError::UnexpectedReply(format!(
            "expected {} replies, got {}",
            APPEND_REPLIES,
            replies.len()
        )));
    }

    match &replies[APPEND_REPLIES - 1] {
        Value::Int(count) if *count >= 0 => Ok(*count as u64),
        other => Err(TurnstileError::UnexpectedReply(format!(
            "expected a non-negative count, got {:?}",
            other
        ))),
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(
        &self,
        key: &str,
        event: &WindowEvent,
        window_start_ms: i64,
        ttl: Duration,
    ) -> Result<u64> {
        let redis_key = self.redis_key(key);
        let mut connection = self.connection.clone();

        let replies: Vec<Value> = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg("-inf")
            .arg(window_start_ms)
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(event.timestamp_ms)
            .arg(&event.member)
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(ttl.as_millis() as u64)
            .cmd("ZCOUNT")
            .arg(&redis_key)
            .arg(format!("({}", window_start_ms))
            .arg("+inf")
            .query_async(&mut connection)
            .await?;

        trace!(key = %redis_key, replies = ?replies, "Appended window event");

        window_count(&replies)
    }

    async fn remove(&self, key: &str, member: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        let _removed: u64 = connection.zrem(self.redis_key(key), member).await?;
        Ok(())
    }
}
