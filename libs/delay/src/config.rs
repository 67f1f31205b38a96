//! Serializable strategy configuration.

use serde::{Deserialize, Serialize};

use crate::error::DelayError;
use crate::strategy::{
    DelayStrategy, DEFAULT_EXPONENTIAL_BASE, DEFAULT_LINEAR_INCREMENT_MS, DEFAULT_MULTIPLIER,
};

/// A strategy block as it appears in a YAML config file.
///
/// ```yaml
/// delay:
///   strategy: linear
///   initial_ms: 100
///   linear_increment_ms: 50
///   max_ms: 2000
/// ```
///
/// The strategy name stays a string until [`build`](Self::build) so an
/// unknown name surfaces as [`DelayError::UnsupportedStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub strategy: String,
    pub initial_ms: f64,
    pub linear_increment_ms: f64,
    pub multiplier: f64,
    pub exponential_base: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<f64>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            strategy: "fixed".to_string(),
            initial_ms: 0.0,
            linear_increment_ms: DEFAULT_LINEAR_INCREMENT_MS,
            multiplier: DEFAULT_MULTIPLIER,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            max_ms: None,
        }
    }
}

impl DelayConfig {
    /// Validate and build the strategy.
    pub fn build(&self) -> Result<DelayStrategy, DelayError> {
        let kind = self.strategy.parse()?;
        Ok(DelayStrategy::new(kind, self.initial_ms)?
            .with_linear_increment_ms(self.linear_increment_ms)
            .with_multiplier(self.multiplier)
            .with_exponential_base(self.exponential_base)
            .with_max_ms(self.max_ms))
    }
}
