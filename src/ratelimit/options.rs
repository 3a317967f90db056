//! Rate limiting policy value objects.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// Time unit of an [`Interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of milliseconds in one unit.
    pub fn millis(&self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TurnstileError;

    /// Accepts plural and singular names in any case, e.g. `SECONDS` or `minute`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "milliseconds" | "millisecond" | "ms" => Ok(TimeUnit::Milliseconds),
            "seconds" | "second" | "s" => Ok(TimeUnit::Seconds),
            "minutes" | "minute" | "m" => Ok(TimeUnit::Minutes),
            "hours" | "hour" | "h" => Ok(TimeUnit::Hours),
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            other => Err(TurnstileError::Configuration(format!(
                "unknown time unit '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(name)
    }
}

/// A positive amount of time, e.g. `10 seconds`.
///
/// Equality is by value: `1 minute` and `60 seconds` are different intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    amount: u64,
    unit: TimeUnit,
}

impl Interval {
    /// Create an interval, rejecting zero amounts and lengths that do not fit
    /// in signed milliseconds.
    pub fn new(amount: u64, unit: TimeUnit) -> Result<Self> {
        if amount == 0 {
            return Err(TurnstileError::Configuration(
                "interval amount must be greater than zero".to_string(),
            ));
        }

        match amount.checked_mul(unit.millis()) {
            Some(millis) if millis <= i64::MAX as u64 => Ok(Self { amount, unit }),
            _ => Err(TurnstileError::Configuration(format!(
                "interval of {} {} is too long",
                amount, unit
            ))),
        }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Length of the interval in milliseconds.
    pub fn to_millis(&self) -> u64 {
        // bounded by the check in `new`
        self.amount * self.unit.millis()
    }

    pub fn to_duration(&self) -> Duration {
        Duration::from_millis(self.to_millis())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

/// How many times a denied call is retried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    retry_count: u32,
    interval: Interval,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, interval: Interval) -> Self {
        Self {
            retry_count,
            interval,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }
}

/// Resolved rate limiting policy for a single key.
///
/// Options are built fresh for every resolution and never mutated.
/// `blocked` takes precedence over `enabled`; the quota fields only carry
/// meaning when the policy is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    resolved_key: String,
    enabled: bool,
    blocked: bool,
    max_requests: u64,
    interval: Option<Interval>,
    retry: Option<RetryPolicy>,
}

impl Options {
    /// An enabled policy admitting `max_requests` calls per `interval`.
    pub fn enabled(key: impl Into<String>, max_requests: u64, interval: Interval) -> Self {
        Self {
            resolved_key: key.into(),
            enabled: true,
            blocked: false,
            max_requests,
            interval: Some(interval),
            retry: None,
        }
    }

    /// A policy under which the key is not limited at all.
    pub fn disabled(key: impl Into<String>) -> Self {
        Self {
            resolved_key: key.into(),
            enabled: false,
            blocked: false,
            max_requests: 0,
            interval: None,
            retry: None,
        }
    }

    /// A policy forbidding every call for the key.
    pub fn blocked(key: impl Into<String>) -> Self {
        Self {
            blocked: true,
            ..Self::disabled(key)
        }
    }

    /// Attach a retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Mark the policy blocked, keeping whatever quota it carries.
    pub fn with_blocked(mut self) -> Self {
        self.blocked = true;
        self
    }

    pub fn resolved_key(&self) -> &str {
        &self.resolved_key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window length; `None` unless the policy is enabled.
    pub fn interval(&self) -> Option<Interval> {
        self.interval
    }

    pub fn is_retry_enabled(&self) -> bool {
        self.retry.is_some()
    }

    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }

    /// Number of checker invocations allowed before giving up.
    pub fn attempts(&self) -> u64 {
        self.retry
            .map_or(1, |retry| u64::from(retry.retry_count()) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_to_millis() {
        assert_eq!(Interval::new(250, TimeUnit::Milliseconds).unwrap().to_millis(), 250);
        assert_eq!(Interval::new(10, TimeUnit::Seconds).unwrap().to_millis(), 10_000);
        assert_eq!(Interval::new(1, TimeUnit::Minutes).unwrap().to_millis(), 60_000);
        assert_eq!(Interval::new(2, TimeUnit::Hours).unwrap().to_millis(), 7_200_000);
        assert_eq!(Interval::new(1, TimeUnit::Days).unwrap().to_millis(), 86_400_000);
    }

    #[test]
    fn test_interval_duration() {
        let interval = Interval::new(30, TimeUnit::Seconds).unwrap();
        assert_eq!(interval.to_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_interval_rejects_zero_and_overflow() {
        assert!(matches!(
            Interval::new(0, TimeUnit::Seconds),
            Err(TurnstileError::Configuration(_))
        ));
        assert!(matches!(
            Interval::new(u64::MAX / 2, TimeUnit::Days),
            Err(TurnstileError::Configuration(_))
        ));
    }

    #[test]
    fn test_interval_value_equality() {
        let a = Interval::new(1, TimeUnit::Minutes).unwrap();
        let b = Interval::new(1, TimeUnit::Minutes).unwrap();
        let c = Interval::new(60, TimeUnit::Seconds).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_time_unit_parsing() {
        assert_eq!("SECONDS".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert_eq!("hours".parse::<TimeUnit>().unwrap(), TimeUnit::Hours);
        assert_eq!("Millisecond".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_options_equality() {
        let interval = Interval::new(10, TimeUnit::Hours).unwrap();
        let retry = RetryPolicy::new(4, Interval::new(100, TimeUnit::Milliseconds).unwrap());

        assert_eq!(
            Options::enabled("test", 50, interval),
            Options::enabled("test", 50, interval)
        );
        assert_ne!(
            Options::enabled("test", 50, interval),
            Options::enabled("test", 50, interval).with_retry(retry)
        );
        assert_eq!(
            Options::enabled("test", 50, interval).with_retry(retry),
            Options::enabled("test", 50, interval).with_retry(retry)
        );
        assert_ne!(Options::disabled("test"), Options::blocked("test"));
    }

    #[test]
    fn test_attempts() {
        let interval = Interval::new(1, TimeUnit::Seconds).unwrap();
        let options = Options::enabled("test", 1, interval);
        assert_eq!(options.attempts(), 1);
        assert!(!options.is_retry_enabled());

        let options = options.with_retry(RetryPolicy::new(2, interval));
        assert_eq!(options.attempts(), 3);
        assert!(options.is_retry_enabled());
    }

    #[test]
    fn test_blocked_is_not_enabled() {
        let options = Options::blocked("key");
        assert!(options.is_blocked());
        assert!(!options.is_enabled());
        assert_eq!(options.interval(), None);
    }

    #[test]
    fn test_blocked_keeps_enabled_quota() {
        let interval = Interval::new(1, TimeUnit::Minutes).unwrap();
        let options = Options::enabled("key", 5, interval).with_blocked();

        assert!(options.is_blocked());
        assert!(options.is_enabled());
        assert_eq!(options.max_requests(), 5);
        assert_eq!(options.interval(), Some(interval));
        assert_ne!(options, Options::blocked("key"));
    }
}
