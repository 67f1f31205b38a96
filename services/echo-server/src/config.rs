//! Echo server configuration.
//!
//! Loaded from a YAML file with a top-level `server` section:
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8815
//!   log_level: info
//!   allow_header_overrides: true
//!   delay:
//!     strategy: exponential
//!     initial_ms: 100
//!     exponential_base: 2
//!     max_ms: 5000
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use netfault_delay::DelayConfig;
use serde::Deserialize;

/// Echo server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Response delay strategy.
    pub delay: DelayConfig,

    /// Whether callers may replace the delay strategy per call.
    pub allow_header_overrides: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8815,
            log_level: "info".to_string(),
            delay: DelayConfig::default(),
            allow_header_overrides: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    server: Option<ServerConfig>,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from YAML text.
    ///
    /// The delay block is validated here so a bad strategy fails at startup.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(text).context("Configuration is not valid YAML")?;
        let config = file
            .server
            .context("Configuration must contain a 'server' key")?;

        config
            .delay
            .build()
            .context("Invalid server.delay configuration")?;

        Ok(config)
    }

    /// Address string to bind to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_section() {
        let config = ServerConfig::from_yaml("server: {}\n").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:8815");
    }

    #[test]
    fn test_full_section() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 9000
  log_level: debug
  allow_header_overrides: true
  delay:
    strategy: linear
    initial_ms: 100
    linear_increment_ms: 25
    max_ms: 400
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, "debug");
        assert!(config.allow_header_overrides);
        assert_eq!(config.delay.strategy, "linear");
        assert_eq!(config.delay.linear_increment_ms, 25.0);
        assert_eq!(config.delay.max_ms, Some(400.0));
    }

    #[test]
    fn test_missing_server_key() {
        let err = ServerConfig::from_yaml("client:\n  port: 1\n").unwrap_err();
        assert!(err.to_string().contains("'server'"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = ServerConfig::from_yaml("server:\n  delay:\n    strategy: random\n").unwrap_err();
        assert!(format!("{err:#}").contains("unsupported delay strategy: random"));
    }

    #[test]
    fn test_negative_initial_rejected() {
        let err =
            ServerConfig::from_yaml("server:\n  delay:\n    initial_ms: -5\n").unwrap_err();
        assert!(format!("{err:#}").contains("initial_ms"));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/server.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/server.yaml"));
    }
}
