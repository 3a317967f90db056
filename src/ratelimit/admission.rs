//! Admission orchestration.
//!
//! Ties together key resolution, options resolution and the rate checker,
//! retrying denied calls according to the resolved retry policy.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use super::checker::RateChecker;
use super::clock::{Sleeper, TokioSleeper};
use super::declaration::RateLimited;
use super::key::{CallContext, DefaultKeyResolver, KeyResolver};
use super::resolver::OptionsResolver;
use crate::error::{Result, TurnstileError};

/// Decides whether a declared operation may run.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct AdmissionController {
    key_resolver: Arc<dyn KeyResolver>,
    options_resolver: Arc<dyn OptionsResolver>,
    checker: Arc<dyn RateChecker>,
    sleeper: Arc<dyn Sleeper>,
}

impl AdmissionController {
    /// Create a controller using the default key resolver and tokio sleeps.
    pub fn new(
        options_resolver: Arc<dyn OptionsResolver>,
        checker: Arc<dyn RateChecker>,
    ) -> Self {
        Self {
            key_resolver: Arc::new(DefaultKeyResolver),
            options_resolver,
            checker,
            sleeper: Arc::new(TokioSleeper::new()),
        }
    }

    pub fn with_key_resolver(mut self, key_resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = key_resolver;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Admit a call or fail with the reason it may not proceed.
    ///
    /// # Errors
    /// - [`TurnstileError::CallBlocked`] if the policy blocks the key
    /// - [`TurnstileError::RateLimitExceeded`] once every attempt was denied
    ///   or a retry wait was interrupted
    /// - any key or options resolution error, unchanged
    pub async fn admit(
        &self,
        declaration: &RateLimited,
        context: Option<&CallContext>,
    ) -> Result<()> {
        let key = self.key_resolver.resolve(
            &declaration.key,
            &declaration.key_expression,
            context,
        )?;
        let options = self.options_resolver.resolve(&key, declaration, context)?;

        if options.is_blocked() {
            debug!(key = %key, "Call blocked by configuration");
            return Err(TurnstileError::CallBlocked { key });
        }

        let interval = match options.interval() {
            Some(interval) if options.is_enabled() => interval,
            _ => {
                trace!(key = %key, "Rate limiting disabled for key");
                return Ok(());
            }
        };

        let mut remaining = options.attempts();
        loop {
            if self
                .checker
                .check(&key, options.max_requests(), &interval)
                .await
            {
                return Ok(());
            }
            remaining -= 1;

            match options.retry() {
                Some(retry) if remaining > 0 => {
                    debug!(
                        key = %key,
                        remaining = remaining,
                        wait = %retry.interval(),
                        "Call denied, retrying"
                    );
                    self.sleeper
                        .sleep(retry.interval().to_duration())
                        .await
                        .map_err(|e| TurnstileError::RateLimitExceeded {
                            key: key.clone(),
                            source: Some(e),
                        })?;
                }
                _ => {
                    debug!(key = %key, "Rate limit exceeded, rejecting call");
                    return Err(TurnstileError::exceeded(key));
                }
            }
        }
    }

    /// Run `operation` only if the call is admitted.
    pub async fn call<F, T>(
        &self,
        declaration: &RateLimited,
        context: Option<&CallContext>,
        operation: F,
    ) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.admit(declaration, context).await?;
        Ok(operation.await)
    }
}
