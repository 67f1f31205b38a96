//! Delay strategies for netfault.
//!
//! This library provides:
//! - [`DelayStrategy`]: a small deterministic state machine producing a
//!   sequence of delays (fixed, linear, multiplier, exponential), optionally
//!   clamped to a ceiling
//! - [`DelayConfig`]: the YAML strategy block used by the echo server and
//!   client
//! - [`DelayOverride`]: per-call replacement of strategy parameters decoded
//!   from `x-delay-*` metadata, and [`override_metadata`] to produce it
//!
//! ```
//! use netfault_delay::{DelayKind, DelayStrategy};
//!
//! let mut strategy = DelayStrategy::new(DelayKind::Linear, 100.0)
//!     .unwrap()
//!     .with_linear_increment_ms(50.0);
//! assert_eq!(strategy.next_delay(), 0.1);
//! assert_eq!(strategy.next_delay(), 0.15);
//! ```

mod config;
mod error;
pub mod overrides;
mod strategy;

pub use config::DelayConfig;
pub use error::DelayError;
pub use overrides::{override_metadata, DelayOverride, OVERRIDE_KEYS};
pub use strategy::{DelayKind, DelayStrategy};
