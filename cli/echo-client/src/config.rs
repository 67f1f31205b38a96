//! Echo client configuration.
//!
//! Loaded from a YAML file with a top-level `client` section. `delay` is
//! the server-side delay the client asks for on each call; `interval` is the
//! gap the client leaves between calls.

use std::path::Path;

use anyhow::{Context, Result};
use netfault_delay::DelayConfig;
use serde::Deserialize;

/// Echo client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Echo server host.
    pub host: String,

    /// Echo server port.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Number of calls to make.
    pub repetitions: u32,

    /// Text sent in every message.
    pub message_template: String,

    /// Delay requested from the server.
    pub delay: DelayConfig,

    /// Gap between calls.
    pub interval: DelayConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8815,
            log_level: "info".to_string(),
            repetitions: 1,
            message_template: "Hello from client".to_string(),
            delay: DelayConfig::default(),
            interval: DelayConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    client: Option<ClientConfig>,
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from YAML text, validating both strategy blocks.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(text).context("Configuration is not valid YAML")?;
        let config = file
            .client
            .context("Configuration must contain a 'client' key")?;

        config
            .delay
            .build()
            .context("Invalid client.delay configuration")?;
        config
            .interval
            .build()
            .context("Invalid client.interval configuration")?;

        Ok(config)
    }
}
