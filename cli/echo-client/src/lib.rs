//! Echo client for netfault.
//!
//! Sends a configurable series of echo actions, asking the server for a
//! growing (or fixed) response delay and leaving a growing (or fixed) gap
//! between calls. Useful for finding the idle and in-flight limits of
//! whatever sits between client and server.

pub mod config;
pub mod error;
pub mod runner;

pub use config::ClientConfig;
pub use error::ClientError;
pub use runner::{CallRecord, RunSummary, Runner};
