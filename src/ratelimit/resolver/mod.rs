//! Options resolution.
//!
//! Each policy source implements [`OptionsResolver`]. When several sources
//! are in play they are composed with [`DelegatingOptionsResolver`], which
//! refuses to choose between resolvers that claim the same key.

mod declared;
mod delegating;
mod property;

pub use declared::DeclarationOptionsResolver;
pub use delegating::DelegatingOptionsResolver;
pub use property::{
    FlatProperties, MissingOptions, PropertyOptionsResolver, PropertySource, DEFAULT_NAMESPACE,
};

use super::declaration::{IntervalSpec, RateLimited};
use super::key::CallContext;
use super::options::{Interval, Options};
use crate::error::{Result, TurnstileError};

/// A source of rate limiting policy.
pub trait OptionsResolver: Send + Sync {
    /// Whether this resolver holds a policy for `key`.
    fn supports(&self, key: &str, declaration: &RateLimited) -> bool;

    /// Resolve the policy for `key`.
    fn resolve(
        &self,
        key: &str,
        declaration: &RateLimited,
        context: Option<&CallContext>,
    ) -> Result<Options>;
}

/// Validate a declared interval, naming `what` in the error.
pub(crate) fn interval_of(key: &str, what: &str, declared: IntervalSpec) -> Result<Interval> {
    Interval::new(declared.amount, declared.unit).map_err(|e| {
        TurnstileError::Configuration(format!("invalid {} for '{}': {}", what, key, e))
    })
}
