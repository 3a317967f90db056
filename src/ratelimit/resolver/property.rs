//! Resolver reading policies from a flat property namespace.
//!
//! For a key `k` under namespace `ns` the following properties are read:
//!
//! ```text
//! ns.k.enabled               true | false
//! ns.k.blocked               true | false (optional)
//! ns.k.requests              positive integer
//! ns.k.interval              positive integer
//! ns.k.interval.unit         time unit, default minutes
//! ns.k.retry.enabled         true | false (optional)
//! ns.k.retry.count           positive integer
//! ns.k.retry.interval        positive integer
//! ns.k.retry.interval.unit   time unit, default minutes
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info};

use super::OptionsResolver;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::declaration::RateLimited;
use crate::ratelimit::key::CallContext;
use crate::ratelimit::options::{Interval, Options, RetryPolicy, TimeUnit};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "rate.limited";

/// Read-only flat string property lookup.
pub trait PropertySource: Send + Sync {
    fn property(&self, name: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl PropertySource for BTreeMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// What to do when no property entry exists for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingOptions {
    /// Fail with a configuration error
    #[default]
    Fail,
    /// Treat the key as not limited
    Disabled,
}

/// Flat property map, loadable from YAML.
///
/// Nested mappings are flattened with `.` separators, so both
/// `rate.limited.api.enabled: true` and the nested form produce the same
/// property name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatProperties {
    entries: BTreeMap<String, String>,
}

impl FlatProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, replacing any previous value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load properties from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit properties");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load properties from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml).map_err(|e| {
            TurnstileError::Configuration(format!("Failed to parse properties: {}", e))
        })?;

        let mut properties = Self::new();
        match value {
            Value::Null => {}
            Value::Mapping(_) => properties.flatten("", &value)?,
            _ => {
                return Err(TurnstileError::Configuration(
                    "properties document must be a mapping".to_string(),
                ))
            }
        }

        Ok(properties)
    }

    fn flatten(&mut self, prefix: &str, value: &Value) -> Result<()> {
        match value {
            Value::Mapping(mapping) => {
                for (name, child) in mapping {
                    let name = scalar(name).ok_or_else(|| {
                        TurnstileError::Configuration(format!(
                            "property names under '{}' must be scalars",
                            prefix
                        ))
                    })?;
                    let full = if prefix.is_empty() {
                        name
                    } else {
                        format!("{}.{}", prefix, name)
                    };
                    self.flatten(&full, child)?;
                }
                Ok(())
            }
            Value::Tagged(tagged) => self.flatten(prefix, &tagged.value),
            other => {
                let text = scalar(other).ok_or_else(|| {
                    TurnstileError::Configuration(format!(
                        "property '{}' must be a scalar value",
                        prefix
                    ))
                })?;
                self.entries.insert(prefix.to_string(), text);
                Ok(())
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl PropertySource for FlatProperties {
    fn property(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }
}

/// Resolves options from a [`PropertySource`].
pub struct PropertyOptionsResolver<S> {
    source: S,
    namespace: String,
    missing: MissingOptions,
}

impl<S: PropertySource> PropertyOptionsResolver<S> {
    /// Resolver over `source` using [`DEFAULT_NAMESPACE`], failing on missing keys.
    pub fn new(source: S) -> Self {
        Self {
            source,
            namespace: DEFAULT_NAMESPACE.to_string(),
            missing: MissingOptions::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_missing(mut self, missing: MissingOptions) -> Self {
        self.missing = missing;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lookup(&self, key: &str, suffix: &str) -> Option<String> {
        self.source
            .property(&format!("{}.{}.{}", self.namespace, key, suffix))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn flag(&self, key: &str, suffix: &str) -> Result<Option<bool>> {
        self.lookup(key, suffix)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(key, suffix, &value)),
            })
            .transpose()
    }

    /// A required, strictly positive integer property.
    fn positive(&self, key: &str, suffix: &str) -> Result<u64> {
        let value = self.lookup(key, suffix).ok_or_else(|| {
            TurnstileError::Configuration(format!(
                "missing property '{}.{}.{}'",
                self.namespace, key, suffix
            ))
        })?;

        match value.parse::<i64>() {
            Ok(n) if n > 0 => Ok(n as u64),
            _ => Err(self.invalid(key, suffix, &value)),
        }
    }

    fn interval(&self, key: &str, suffix: &str) -> Result<Interval> {
        let amount = self.positive(key, suffix)?;
        let unit_suffix = format!("{}.unit", suffix);
        let unit = match self.lookup(key, &unit_suffix) {
            Some(unit) => unit.parse::<TimeUnit>()?,
            None => TimeUnit::Minutes,
        };

        Interval::new(amount, unit)
    }

    fn invalid(&self, key: &str, suffix: &str, value: &str) -> TurnstileError {
        TurnstileError::Configuration(format!(
            "invalid value '{}' for property '{}.{}.{}'",
            value, self.namespace, key, suffix
        ))
    }
}

impl<S: PropertySource> OptionsResolver for PropertyOptionsResolver<S> {
    fn supports(&self, key: &str, _declaration: &RateLimited) -> bool {
        // `blocked=false` alone carries no policy
        self.lookup(key, "enabled").is_some()
            || self
                .lookup(key, "blocked")
                .is_some_and(|value| !value.eq_ignore_ascii_case("false"))
    }

    fn resolve(
        &self,
        key: &str,
        _declaration: &RateLimited,
        _context: Option<&CallContext>,
    ) -> Result<Options> {
        let blocked = self.flag(key, "blocked")? == Some(true);

        let enabled = match self.flag(key, "enabled")? {
            Some(enabled) => enabled,
            None if blocked => {
                debug!(key = %key, "Key is blocked by properties");
                return Ok(Options::blocked(key));
            }
            None => {
                return match self.missing {
                    MissingOptions::Disabled => {
                        debug!(key = %key, "No properties for key, treating as disabled");
                        Ok(Options::disabled(key))
                    }
                    MissingOptions::Fail => Err(TurnstileError::Configuration(format!(
                        "no rate limit properties for '{}' under '{}'",
                        key, self.namespace
                    ))),
                };
            }
        };

        if !enabled {
            let options = Options::disabled(key);
            return Ok(if blocked { options.with_blocked() } else { options });
        }

        let requests = self.positive(key, "requests")?;
        let interval = self.interval(key, "interval")?;
        let mut options = Options::enabled(key, requests, interval);

        if self.flag(key, "retry.enabled")? == Some(true) {
            let count = self.positive(key, "retry.count")?;
            let count = u32::try_from(count)
                .map_err(|_| self.invalid(key, "retry.count", &count.to_string()))?;
            let retry_interval = self.interval(key, "retry.interval")?;
            options = options.with_retry(RetryPolicy::new(count, retry_interval));
        }
        if blocked {
            options = options.with_blocked();
        }

        debug!(
            key = %key,
            limit = requests,
            interval = %interval,
            retry = options.is_retry_enabled(),
            blocked = blocked,
            "Resolved policy from properties"
        );

        Ok(options)
    }
}
