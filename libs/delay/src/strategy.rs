//! The delay strategy state machine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DelayError;
use crate::overrides::DelayOverride;

/// Default increment for the linear strategy.
pub const DEFAULT_LINEAR_INCREMENT_MS: f64 = 0.0;

/// Default factor for the multiplier strategy.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Default base for the exponential strategy.
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// How progress advances between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    /// The same delay every time.
    Fixed,
    /// Progress grows by a constant increment.
    Linear,
    /// Progress is multiplied by a constant factor.
    Multiplier,
    /// Progress becomes `base ^ (progress / 1000)`.
    Exponential,
}

impl DelayKind {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DelayKind::Fixed => "fixed",
            DelayKind::Linear => "linear",
            DelayKind::Multiplier => "multiplier",
            DelayKind::Exponential => "exponential",
        }
    }
}

impl fmt::Display for DelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelayKind {
    type Err = DelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(DelayKind::Fixed),
            "linear" => Ok(DelayKind::Linear),
            "multiplier" => Ok(DelayKind::Multiplier),
            "exponential" => Ok(DelayKind::Exponential),
            other => Err(DelayError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// A delay policy plus its mutable progress.
///
/// `next_delay` is the only operation that advances progress. Callers that
/// share one strategy across tasks must serialize access themselves (the
/// echo server keeps it behind a mutex).
#[derive(Debug, Clone, PartialEq)]
pub struct DelayStrategy {
    kind: DelayKind,
    initial_ms: f64,
    linear_increment_ms: f64,
    multiplier: f64,
    exponential_base: f64,
    max_ms: Option<f64>,
    progress_ms: f64,
}

impl DelayStrategy {
    /// Create a strategy with default tunables.
    ///
    /// Fails if `initial_ms` is negative or NaN.
    pub fn new(kind: DelayKind, initial_ms: f64) -> Result<Self, DelayError> {
        if !(initial_ms >= 0.0) {
            return Err(DelayError::NegativeInitial(initial_ms));
        }

        Ok(Self {
            kind,
            initial_ms,
            linear_increment_ms: DEFAULT_LINEAR_INCREMENT_MS,
            multiplier: DEFAULT_MULTIPLIER,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            max_ms: None,
            progress_ms: initial_ms,
        })
    }

    /// Set the linear increment.
    pub fn with_linear_increment_ms(mut self, increment_ms: f64) -> Self {
        self.linear_increment_ms = increment_ms;
        self
    }

    /// Set the multiplier factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the exponential base.
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Set (or clear) the ceiling.
    pub fn with_max_ms(mut self, max_ms: Option<f64>) -> Self {
        self.max_ms = max_ms;
        self
    }

    pub fn kind(&self) -> DelayKind {
        self.kind
    }

    pub fn initial_ms(&self) -> f64 {
        self.initial_ms
    }

    pub fn linear_increment_ms(&self) -> f64 {
        self.linear_increment_ms
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn exponential_base(&self) -> f64 {
        self.exponential_base
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.max_ms
    }

    /// Current progress in milliseconds.
    pub fn progress_ms(&self) -> f64 {
        self.progress_ms
    }

    /// Compute the next delay in seconds and advance progress.
    ///
    /// The stored progress and the returned delay are clamped to `max_ms`
    /// independently, each from its own unclamped value.
    pub fn next_delay(&mut self) -> f64 {
        let mut delay_ms = self.progress_ms;

        match self.kind {
            DelayKind::Fixed => {}
            DelayKind::Linear => {
                self.progress_ms += self.linear_increment_ms;
            }
            DelayKind::Multiplier => {
                self.progress_ms *= self.multiplier;
            }
            DelayKind::Exponential => {
                // Not conventional backoff: the new progress is the base raised
                // to the previous progress in seconds, and it is returned as-is.
                self.progress_ms = self.exponential_base.powf(self.progress_ms / 1000.0);
                delay_ms = self.progress_ms;
            }
        }

        if let Some(max_ms) = self.max_ms {
            self.progress_ms = self.progress_ms.min(max_ms);
            delay_ms = delay_ms.min(max_ms);
        }

        delay_ms.max(0.0) / 1000.0
    }

    /// Like [`next_delay`](Self::next_delay), as a sleepable duration.
    ///
    /// Delays too large to represent saturate to `Duration::MAX`.
    pub fn next_delay_duration(&mut self) -> Duration {
        let seconds = self.next_delay();
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Restart the sequence from `initial_ms`.
    pub fn reset(&mut self) {
        self.progress_ms = self.initial_ms;
    }

    /// Build a fresh strategy with some parameters replaced.
    ///
    /// Omitted fields fall back to this strategy's configuration, and
    /// `initial_ms` falls back to the configured seed, never to the current
    /// progress. The result always starts from its own `initial_ms`; `self`
    /// is left untouched.
    pub fn apply_override(&self, overrides: &DelayOverride) -> Result<Self, DelayError> {
        let strategy = Self::new(
            overrides.strategy.unwrap_or(self.kind),
            overrides.initial_ms.unwrap_or(self.initial_ms),
        )?;

        Ok(strategy
            .with_linear_increment_ms(
                overrides
                    .linear_increment_ms
                    .unwrap_or(self.linear_increment_ms),
            )
            .with_multiplier(overrides.multiplier.unwrap_or(self.multiplier))
            .with_exponential_base(overrides.exponential_base.unwrap_or(self.exponential_base))
            .with_max_ms(overrides.max_ms.or(self.max_ms)))
    }
}
