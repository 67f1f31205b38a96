//! Error types for delay configuration.

use thiserror::Error;

/// Errors raised while building or overriding a delay strategy.
///
/// Every variant is a configuration error: it is fatal at startup, or fatal
/// for the single call whose metadata produced it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DelayError {
    /// `initial_ms` was negative (or not a number).
    #[error("initial_ms must be non-negative, got {0}")]
    NegativeInitial(f64),

    /// The strategy name is not one of the supported kinds.
    #[error("unsupported delay strategy: {0}")]
    UnsupportedStrategy(String),

    /// An override header carried a value that is not a float.
    #[error("invalid float for header '{key}': {value}")]
    InvalidOverride { key: String, value: String },
}

impl DelayError {
    /// Name of the offending configuration field.
    pub fn field(&self) -> &str {
        match self {
            DelayError::NegativeInitial(_) => "initial_ms",
            DelayError::UnsupportedStrategy(_) => "strategy",
            DelayError::InvalidOverride { key, .. } => key,
        }
    }
}
