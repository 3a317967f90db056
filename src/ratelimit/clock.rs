//! Time sources and retry waits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Interrupted;

/// Wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// System clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time value.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(now_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_millis() as i64;
    }

    pub fn set(&self, now_millis: i64) {
        *self.now.lock() = now_millis;
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        *self.now.lock()
    }
}

/// Waits between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`, or fail if the wait is interrupted.
    async fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

/// Sleeps on the tokio timer, optionally cut short by a shutdown signal.
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper {
    shutdown: Option<watch::Receiver<bool>>,
}

impl TokioSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt waits once `true` is published on `shutdown`.
    pub fn with_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Err(Interrupted);
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = shutdown.wait_for(|stop| *stop) => Err(Interrupted),
        }
    }
}
