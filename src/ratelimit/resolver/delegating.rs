//! Combinator choosing exactly one resolver per key.

use std::sync::Arc;

use tracing::{debug, warn};

use super::OptionsResolver;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::declaration::RateLimited;
use crate::ratelimit::key::CallContext;
use crate::ratelimit::options::Options;

/// Delegates to the single resolver supporting a key.
///
/// There is no precedence between resolvers: if more than one supports a
/// key the configuration is ambiguous and resolution fails. When none
/// supports it, resolution fails unless `fail_on_missing` is off, in which
/// case the key is not limited.
pub struct DelegatingOptionsResolver {
    resolvers: Vec<Arc<dyn OptionsResolver>>,
    fail_on_missing: bool,
}

impl DelegatingOptionsResolver {
    /// Combinator failing on keys no resolver supports.
    pub fn new(resolvers: Vec<Arc<dyn OptionsResolver>>) -> Self {
        Self {
            resolvers,
            fail_on_missing: true,
        }
    }

    pub fn with_fail_on_missing(mut self, fail_on_missing: bool) -> Self {
        self.fail_on_missing = fail_on_missing;
        self
    }

    /// Append a resolver.
    pub fn push(&mut self, resolver: Arc<dyn OptionsResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl OptionsResolver for DelegatingOptionsResolver {
    fn supports(&self, key: &str, declaration: &RateLimited) -> bool {
        self.resolvers
            .iter()
            .any(|resolver| resolver.supports(key, declaration))
    }

    fn resolve(
        &self,
        key: &str,
        declaration: &RateLimited,
        context: Option<&CallContext>,
    ) -> Result<Options> {
        let supporting: Vec<&Arc<dyn OptionsResolver>> = self
            .resolvers
            .iter()
            .filter(|resolver| resolver.supports(key, declaration))
            .collect();

        match supporting.as_slice() {
            [resolver] => resolver.resolve(key, declaration, context),
            [] if !self.fail_on_missing => {
                debug!(key = %key, "No resolver supports key, treating as disabled");
                Ok(Options::disabled(key))
            }
            _ => {
                warn!(
                    key = %key,
                    supporting = supporting.len(),
                    "Options for key are ambiguous"
                );
                Err(TurnstileError::AmbiguousOptions {
                    key: key.to_string(),
                    supporting: supporting.len(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::options::{Interval, TimeUnit};

    /// Resolver with a fixed answer to `supports`.
    struct Fixed {
        supports: bool,
        max_requests: u64,
    }

    impl OptionsResolver for Fixed {
        fn supports(&self, _key: &str, _declaration: &RateLimited) -> bool {
            self.supports
        }

        fn resolve(
            &self,
            key: &str,
            _declaration: &RateLimited,
            _context: Option<&CallContext>,
        ) -> Result<Options> {
            let interval = Interval::new(1, TimeUnit::Minutes)?;
            Ok(Options::enabled(key, self.max_requests, interval))
        }
    }

    fn fixed(supports: bool, max_requests: u64) -> Arc<dyn OptionsResolver> {
        Arc::new(Fixed {
            supports,
            max_requests,
        })
    }

    fn declaration() -> RateLimited {
        RateLimited::keyed("test")
    }

    #[test]
    fn test_resolves_single_supporting() {
        let resolver = DelegatingOptionsResolver::new(vec![fixed(false, 1), fixed(true, 15)]);
        let options = resolver.resolve("test", &declaration(), None).unwrap();

        assert!(options.is_enabled());
        assert_eq!(options.max_requests(), 15);
    }

    #[test]
    fn test_disables_missing_when_allowed() {
        let resolver = DelegatingOptionsResolver::new(Vec::new()).with_fail_on_missing(false);
        let options = resolver.resolve("test", &declaration(), None).unwrap();

        assert_eq!(options, Options::disabled("test"));
    }

    #[test]
    fn test_fails_on_missing() {
        let resolver = DelegatingOptionsResolver::new(vec![fixed(false, 1)]);
        let result = resolver.resolve("test", &declaration(), None);

        assert!(matches!(
            result,
            Err(TurnstileError::AmbiguousOptions { supporting: 0, .. })
        ));
    }

    #[test]
    fn test_fails_if_more_than_one() {
        for fail_on_missing in [true, false] {
            let resolver =
                DelegatingOptionsResolver::new(vec![fixed(true, 1), fixed(false, 2), fixed(true, 3)])
                    .with_fail_on_missing(fail_on_missing);
            let result = resolver.resolve("test", &declaration(), None);

            assert!(matches!(
                result,
                Err(TurnstileError::AmbiguousOptions { supporting: 2, .. })
            ));
        }
    }

    #[test]
    fn test_supports_any() {
        let mut resolver = DelegatingOptionsResolver::new(vec![fixed(false, 1)]);
        assert!(!resolver.supports("test", &declaration()));

        resolver.push(fixed(true, 1));
        assert_eq!(resolver.len(), 2);
        assert!(resolver.supports("test", &declaration()));
    }
}
