//! Configuration management for Turnstile.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ratelimit::resolver::{MissingOptions, DEFAULT_NAMESPACE};
use crate::ratelimit::DEFAULT_KEY_PREFIX;

/// Prefix of environment variables overriding file settings,
/// e.g. `TURNSTILE__REDIS__URL`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Shared-state backend
    #[serde(default)]
    pub redis: RedisConfig,

    /// Options resolution
    #[serde(default)]
    pub options: OptionsConfig,

    /// Path to a YAML file of flat limit properties
    #[serde(default)]
    pub properties_path: Option<String>,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prepended to every window key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Options resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Property namespace limits are looked up under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// What the property resolver does for a key without an `enabled` entry
    #[serde(default)]
    pub missing: MissingOptions,

    /// Whether a key no resolver supports is an error or runs unlimited
    #[serde(default = "default_fail_on_missing")]
    pub fail_on_missing: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            missing: MissingOptions::default(),
            fail_on_missing: default_fail_on_missing(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_fail_on_missing() -> bool {
    true
}

impl TurnstileConfig {
    /// Load configuration from a file path, overridden by `TURNSTILE__*`
    /// environment variables.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from environment variables alone.
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder().add_source(Self::environment()).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
    }
}
