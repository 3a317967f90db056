//! Resolver reading the policy declared inline at the call site.

use tracing::debug;

use super::{interval_of, OptionsResolver};
use crate::error::{Result, TurnstileError};
use crate::ratelimit::declaration::RateLimited;
use crate::ratelimit::key::CallContext;
use crate::ratelimit::options::{Options, RetryPolicy};

/// Resolves options from [`RateLimited::policy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationOptionsResolver;

impl DeclarationOptionsResolver {
    pub fn new() -> Self {
        Self
    }
}

impl OptionsResolver for DeclarationOptionsResolver {
    fn supports(&self, _key: &str, declaration: &RateLimited) -> bool {
        declaration.policy.is_some()
    }

    fn resolve(
        &self,
        key: &str,
        declaration: &RateLimited,
        _context: Option<&CallContext>,
    ) -> Result<Options> {
        let policy = declaration.policy.as_ref().ok_or_else(|| {
            TurnstileError::UnsupportedConfiguration(format!(
                "'{}' has no inline policy declaration",
                key
            ))
        })?;

        if !policy.enabled {
            debug!(key = %key, "Declared policy is disabled");
            return Ok(Options::disabled(key));
        }

        let interval = interval_of(key, "interval", policy.interval)?;
        let mut options = Options::enabled(key, policy.max_requests, interval);

        if let Some(retry) = policy.retry {
            let retry_interval = interval_of(key, "retry interval", retry.interval)?;
            options = options.with_retry(RetryPolicy::new(retry.count, retry_interval));
        }

        debug!(
            key = %key,
            limit = options.max_requests(),
            interval = %interval,
            retry = options.is_retry_enabled(),
            "Resolved declared policy"
        );

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::options::{Interval, TimeUnit};

    fn resolve(declaration: &RateLimited) -> Result<Options> {
        DeclarationOptionsResolver.resolve("test", declaration, None)
    }

    #[test]
    fn test_resolve_correct() {
        let declaration = RateLimited::new()
            .max_requests(50)
            .interval(10, TimeUnit::Hours);

        assert_eq!(
            resolve(&declaration).unwrap(),
            Options::enabled("test", 50, Interval::new(10, TimeUnit::Hours).unwrap())
        );
    }

    #[test]
    fn test_resolve_correct_with_retry() {
        let declaration = RateLimited::new()
            .max_requests(5)
            .interval(30, TimeUnit::Seconds)
            .retry(4, 100, TimeUnit::Milliseconds);

        let expected = Options::enabled("test", 5, Interval::new(30, TimeUnit::Seconds).unwrap())
            .with_retry(RetryPolicy::new(
                4,
                Interval::new(100, TimeUnit::Milliseconds).unwrap(),
            ));
        assert_eq!(resolve(&declaration).unwrap(), expected);
    }

    #[test]
    fn test_resolve_disabled() {
        let declaration = RateLimited::new().disabled();
        assert_eq!(resolve(&declaration).unwrap(), Options::disabled("test"));
    }

    #[test]
    fn test_disabled_policy_skips_interval_validation() {
        let declaration = RateLimited::new().interval(0, TimeUnit::Seconds).disabled();
        assert!(resolve(&declaration).is_ok());
    }

    #[test]
    fn test_invalid_interval() {
        let declaration = RateLimited::new().inline();
        assert!(matches!(
            resolve(&declaration),
            Err(TurnstileError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_retry_interval() {
        let declaration = RateLimited::new()
            .max_requests(5)
            .interval(1, TimeUnit::Seconds)
            .retry(3, 0, TimeUnit::Seconds);
        assert!(matches!(
            resolve(&declaration),
            Err(TurnstileError::Configuration(_))
        ));
    }

    #[test]
    fn test_supports_only_inline_policies() {
        assert!(DeclarationOptionsResolver.supports("test", &RateLimited::new().inline()));
        assert!(!DeclarationOptionsResolver.supports("test", &RateLimited::keyed("test")));
    }

    #[test]
    fn test_without_policy_is_unsupported() {
        assert!(matches!(
            resolve(&RateLimited::keyed("test")),
            Err(TurnstileError::UnsupportedConfiguration(_))
        ));
    }
}
