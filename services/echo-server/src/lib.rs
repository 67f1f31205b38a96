//! netfault echo server library.
//!
//! Echoes action payloads back after a configurable delay. The delay comes
//! from a shared [`netfault_delay::DelayStrategy`], or from a per-call
//! strategy built out of `x-delay-*` request headers when overrides are
//! enabled.

pub mod api;
pub mod config;
pub mod state;
