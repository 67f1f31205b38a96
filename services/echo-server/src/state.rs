//! Application state shared across request handlers.

use std::sync::Arc;

use netfault_delay::{DelayError, DelayKind, DelayOverride, DelayStrategy};
use tokio::sync::Mutex;

use crate::config::ServerConfig;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    delay: Mutex<DelayStrategy>,
    strategy: DelayKind,
    allow_header_overrides: bool,
    host: String,
    port: u16,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        delay: DelayStrategy,
        allow_header_overrides: bool,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                strategy: delay.kind(),
                delay: Mutex::new(delay),
                allow_header_overrides,
                host: host.into(),
                port,
            }),
        }
    }

    /// Build state from a loaded configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, DelayError> {
        Ok(Self::new(
            config.delay.build()?,
            config.allow_header_overrides,
            config.host.clone(),
            config.port,
        ))
    }

    /// The configured strategy kind, regardless of overrides.
    pub fn strategy(&self) -> DelayKind {
        self.inner.strategy
    }

    pub fn allow_header_overrides(&self) -> bool {
        self.inner.allow_header_overrides
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Delay in seconds for the next call.
    ///
    /// With overrides, a fresh strategy derived from the configured one
    /// yields the delay and the shared progression is left alone. Without,
    /// the shared strategy advances under the lock.
    pub async fn next_delay(&self, overrides: Option<&DelayOverride>) -> Result<f64, DelayError> {
        let mut shared = self.inner.delay.lock().await;
        match overrides {
            Some(overrides) => {
                let mut strategy = shared.apply_override(overrides)?;
                drop(shared);
                Ok(strategy.next_delay())
            }
            None => Ok(shared.next_delay()),
        }
    }
}
