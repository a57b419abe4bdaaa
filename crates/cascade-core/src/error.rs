//! # Error Handling
//!
//! All fallible operations in the engine return [`EngineError`]. The enum
//! mirrors the failure boundaries of the system: document and manifest
//! validation, reference resolution, module dispatch, timeouts, and remote
//! delegation. User-visible step failures are never `EngineError` values —
//! the dispatcher translates module errors into `fail` step results at the
//! boundary, and `EngineError` only escapes for conditions that prevent a
//! workflow from running at all (invalid document, unresolvable context
//! module, instantiation failure).
//!
//! ## Usage
//!
//! ```rust
//! use cascade_core::error::{EngineError, Result};
//!
//! fn lookup(step_id: &str) -> Result<()> {
//!     Err(EngineError::Resolution {
//!         symbol: step_id.to_string(),
//!         message: "unknown step id".to_string(),
//!     })
//! }
//! ```

/// Primary error type for all engine operations.
///
/// Variants correspond to the engine's failure boundaries. Errors that occur
/// inside a module invocation are captured by the dispatcher and surfaced as
/// `fail` step results rather than propagated as `EngineError`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Workflow document or module manifest is structurally invalid.
    ///
    /// Surfaced before the run starts; a workflow with a validation error
    /// never executes.
    #[error("Validation error: {message}")]
    Validation {
        /// What failed validation and why
        message: String,
    },

    /// A reference to a module, method, context id, or step id did not
    /// resolve.
    #[error("Failed to resolve '{symbol}': {message}")]
    Resolution {
        /// The symbol that could not be resolved
        symbol: String,
        /// Why resolution failed
        message: String,
    },

    /// A module raised during invocation.
    #[error("Dispatch error in '{target}': {message}")]
    Dispatch {
        /// The `<instance>.<method>` target that failed
        target: String,
        /// Underlying failure description
        message: String,
    },

    /// A blocking operation or approval gate ran out of time.
    #[error("Timeout: {message}")]
    Timeout {
        /// What timed out and after how long
        message: String,
    },

    /// Remote workflow fetch or child engine failure.
    #[error("Delegation error: {message}")]
    Delegation {
        /// Underlying failure description
        message: String,
    },

    /// Failed to serialize or deserialize JSON data.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying serde failure
        message: String,
    },

    /// A `${...}` placeholder failed to render under strict templating.
    #[error("Template error: {message}")]
    Template {
        /// The placeholder and why it failed
        message: String,
    },

    /// Configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Which setting failed and why
        message: String,
    },

    /// Filesystem or subprocess I/O failure.
    #[error("I/O error: {message}")]
    Io {
        /// Underlying I/O failure
        message: String,
    },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn resolution(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            symbol: symbol.into(),
            message: message.into(),
        }
    }

    pub fn delegation(message: impl Into<String>) -> Self {
        Self::Delegation {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Validation {
            message: format!("invalid YAML: {}", err),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_symbol_and_message() {
        let err = EngineError::resolution("context.gitops", "not declared in context_modules");
        assert_eq!(
            err.to_string(),
            "Failed to resolve 'context.gitops': not declared in context_modules"
        );
    }

    #[test]
    fn serde_json_errors_convert() {
        let err: EngineError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, EngineError::Serialization { .. }));
    }
}
