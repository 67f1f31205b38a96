pub mod config;
pub mod proxy;

pub use config::Config;
pub use proxy::{
    BackendTarget, CloseReason, Listener, ListenerConfig, ListenerStats, PingConfig,
    ProxyConnection,
};
