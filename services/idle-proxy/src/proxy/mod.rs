//! Idle-timeout TCP proxy.
//!
//! This module provides:
//! - TCP listener management with a connection limit
//! - Per-connection supervision of two pumps and an idle watchdog
//! - HTTP ping interception on the client stream
//! - Abortive (reset) teardown of both sockets
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> ProxyConnection -> Backend
//!                          |     ^
//!                 ping? ---+     +--- idle watchdog
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{BackendTarget, Listener, ListenerConfig};
//!
//! let config = ListenerConfig::new("0.0.0.0:8815".parse()?, BackendTarget::new("flight-server", 8815));
//! let listener = Arc::new(Listener::bind(config).await?);
//! listener.run().await?;
//! ```

mod connection;
mod listener;
mod ping;
mod pump;
mod watchdog;

pub use connection::{abort_stream, ActivityClock, CloseReason, ProxyConnection, Side};
pub use listener::{
    BackendTarget, ConnectionError, Listener, ListenerConfig, ListenerStats,
    DEFAULT_IDLE_CHECK_INTERVAL, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
};
pub use ping::{PingConfig, DEFAULT_PING_BODY, DEFAULT_PING_METHOD, DEFAULT_PING_PATH};
pub use pump::{pump, Direction, CHUNK_SIZE};
pub use watchdog::run_idle_watchdog;
