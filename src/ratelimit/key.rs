//! Key resolution for rate limited operations.

use std::fmt;

use tracing::warn;

use crate::error::{Result, TurnstileError};

/// Derivation expression selecting the receiver's type name as the key.
pub const TYPE_ONLY_EXPRESSION: &str = "#type";

/// Information about the call being admitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallContext {
    /// Fully-qualified type name of the receiver
    pub type_name: String,
    /// Name of the invoked operation
    pub method_name: String,
}

impl CallContext {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Context for a method on `T`, using `std::any::type_name` for the receiver.
    pub fn of<T: ?Sized>(method_name: impl Into<String>) -> Self {
        Self::new(std::any::type_name::<T>(), method_name)
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method_name)
    }
}

/// Derives the key identifying a rate limited operation.
pub trait KeyResolver: Send + Sync {
    fn resolve(
        &self,
        explicit_key: &str,
        expression: &str,
        context: Option<&CallContext>,
    ) -> Result<String>;
}

/// Explicit key, then `#type`, then `type.method`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyResolver;

impl KeyResolver for DefaultKeyResolver {
    fn resolve(
        &self,
        explicit_key: &str,
        expression: &str,
        context: Option<&CallContext>,
    ) -> Result<String> {
        if !explicit_key.is_empty() {
            return Ok(explicit_key.to_string());
        }

        let context = context.ok_or(TurnstileError::MissingCallContext)?;

        match expression.trim() {
            "" => {}
            TYPE_ONLY_EXPRESSION => return Ok(context.type_name.clone()),
            other => {
                warn!(
                    expression = %other,
                    call = %context,
                    "Unrecognized key expression, using default key"
                );
            }
        }

        Ok(context.to_string())
    }
}
