//! Call-site rate limit declarations.
//!
//! A [`RateLimited`] value is what an interception layer hands to the
//! admission controller: the explicit key or key expression, and optionally
//! an inline policy. Declarations without an inline policy are resolved from
//! external properties.

use super::options::TimeUnit;

/// Unvalidated interval as written at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    pub amount: u64,
    pub unit: TimeUnit,
}

impl IntervalSpec {
    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }
}

impl Default for IntervalSpec {
    fn default() -> Self {
        Self {
            amount: 0,
            unit: TimeUnit::Minutes,
        }
    }
}

/// Retry sub-declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetrySpec {
    pub count: u32,
    pub interval: IntervalSpec,
}

/// Inline policy carried by a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredPolicy {
    pub enabled: bool,
    pub max_requests: u64,
    pub interval: IntervalSpec,
    pub retry: Option<RetrySpec>,
}

impl Default for DeclaredPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 0,
            interval: IntervalSpec::default(),
            retry: None,
        }
    }
}

/// Declaration attached to a rate limited operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimited {
    /// Explicit key; empty means derive one
    pub key: String,
    /// Key derivation expression, see [`TYPE_ONLY_EXPRESSION`](super::key::TYPE_ONLY_EXPRESSION)
    pub key_expression: String,
    /// Inline policy, `None` when the policy lives in external properties
    pub policy: Option<DeclaredPolicy>,
}

impl RateLimited {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declaration with an explicit key.
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn key_expression(mut self, expression: impl Into<String>) -> Self {
        self.key_expression = expression.into();
        self
    }

    pub fn max_requests(mut self, max_requests: u64) -> Self {
        self.policy_mut().max_requests = max_requests;
        self
    }

    pub fn interval(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.policy_mut().interval = IntervalSpec::new(amount, unit);
        self
    }

    pub fn retry(mut self, count: u32, amount: u64, unit: TimeUnit) -> Self {
        self.policy_mut().retry = Some(RetrySpec {
            count,
            interval: IntervalSpec::new(amount, unit),
        });
        self
    }

    /// Declare the policy inline but switched off.
    pub fn disabled(mut self) -> Self {
        self.policy_mut().enabled = false;
        self
    }

    /// Declare an inline policy with default values.
    pub fn inline(mut self) -> Self {
        self.policy_mut();
        self
    }

    fn policy_mut(&mut self) -> &mut DeclaredPolicy {
        self.policy.get_or_insert_with(DeclaredPolicy::default)
    }
}
