//! Error types for Turnstile.

use thiserror::Error;

/// Raised by a [`Sleeper`](crate::ratelimit::Sleeper) when a retry wait is
/// cut short.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("retry wait was interrupted")]
pub struct Interrupted;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// A policy declaration or property entry is structurally invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resolver recognizes the key but not the requested policy source
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Zero or several resolvers claim the key
    #[error("Ambiguous options for key '{key}': {supporting} resolvers support it")]
    AmbiguousOptions { key: String, supporting: usize },

    /// The policy forbids executing the operation
    #[error("Execution of '{key}' is blocked by configuration")]
    CallBlocked { key: String },

    /// Quota exhausted after all allowed attempts
    #[error("Rate limit for '{key}' has been exceeded")]
    RateLimitExceeded {
        key: String,
        #[source]
        source: Option<Interrupted>,
    },

    /// No explicit key and no call context to derive one from
    #[error("Cannot resolve a key without an explicit key or call context")]
    MissingCallContext,

    /// Redis transport or command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The shared-state backend answered with an unexpected shape
    #[error("Unexpected reply from event log: {0}")]
    UnexpectedReply(String),

    /// Settings loading errors
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// Build a `RateLimitExceeded` error without an underlying cause.
    pub fn exceeded(key: impl Into<String>) -> Self {
        TurnstileError::RateLimitExceeded {
            key: key.into(),
            source: None,
        }
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
