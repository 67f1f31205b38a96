//! Idle proxy configuration.
//!
//! Everything comes from `PROXY_*` environment variables. The defaults put
//! the proxy on port 8815 in front of a `flight-server` host on the same
//! port.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::proxy::{
    BackendTarget, ListenerConfig, PingConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_PING_BODY,
    DEFAULT_PING_METHOD, DEFAULT_PING_PATH,
};

/// Idle proxy configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Host or address to listen on.
    pub listen_host: String,

    /// Port to listen on.
    pub listen_port: u16,

    /// Backend every connection is forwarded to.
    pub backend: BackendTarget,

    /// Idle timeout. `None` when configured as zero or negative.
    pub idle_timeout: Option<Duration>,

    /// Interval between idle checks.
    pub idle_check_interval: Duration,

    /// HTTP ping interception.
    pub ping: PingConfig,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_host = lookup("PROXY_LISTEN_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let listen_port = parse_var(&lookup, "PROXY_LISTEN_PORT", 8815u16)?;

        let backend_host =
            lookup("PROXY_BACKEND_HOST").unwrap_or_else(|| "flight-server".to_string());
        let backend_port = parse_var(&lookup, "PROXY_BACKEND_PORT", 8815u16)?;

        let idle_timeout_secs = parse_var(&lookup, "PROXY_IDLE_TIMEOUT_SECONDS", 300.0f64)?;
        let idle_timeout = if idle_timeout_secs > 0.0 {
            Some(
                Duration::try_from_secs_f64(idle_timeout_secs)
                    .context("PROXY_IDLE_TIMEOUT_SECONDS is out of range.")?,
            )
        } else {
            None
        };

        let idle_check_secs = parse_var(&lookup, "PROXY_IDLE_CHECK_SECONDS", 1.0f64)?;
        if !(idle_check_secs > 0.0) {
            bail!("PROXY_IDLE_CHECK_SECONDS must be greater than zero.");
        }
        let idle_check_interval = Duration::try_from_secs_f64(idle_check_secs)
            .context("PROXY_IDLE_CHECK_SECONDS is out of range.")?;

        let ping = PingConfig::new(
            &lookup("PROXY_HTTP_PING_METHOD").unwrap_or_else(|| DEFAULT_PING_METHOD.to_string()),
            &lookup("PROXY_HTTP_PING_PATH").unwrap_or_else(|| DEFAULT_PING_PATH.to_string()),
            &lookup("PROXY_HTTP_PING_BODY").unwrap_or_else(|| DEFAULT_PING_BODY.to_string()),
        );

        let max_connections =
            parse_var(&lookup, "PROXY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            bail!("PROXY_MAX_CONNECTIONS must be at least 1.");
        }

        let log_level = lookup("PROXY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            listen_host,
            listen_port,
            backend: BackendTarget::new(backend_host, backend_port),
            idle_timeout,
            idle_check_interval,
            ping,
            max_connections,
            log_level,
        })
    }

    /// Listener settings for an already-resolved bind address.
    pub fn listener_config(&self, bind_addr: SocketAddr) -> ListenerConfig {
        ListenerConfig {
            bind_addr,
            backend: self.backend.clone(),
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout,
            idle_check_interval: self.idle_check_interval,
            ping: self.ping.clone(),
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(lookup(name)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{} must be a valid {}.", name, std::any::type_name::<T>()))?
        .unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.listen_port, 8815);
        assert_eq!(config.backend, BackendTarget::new("flight-server", 8815));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.idle_check_interval, Duration::from_secs(1));
        assert_eq!(config.ping, PingConfig::default());
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PROXY_LISTEN_HOST", "127.0.0.1"),
            ("PROXY_LISTEN_PORT", "9000"),
            ("PROXY_BACKEND_HOST", "backend.internal"),
            ("PROXY_BACKEND_PORT", "7000"),
            ("PROXY_IDLE_TIMEOUT_SECONDS", "1.5"),
            ("PROXY_IDLE_CHECK_SECONDS", "0.25"),
            ("PROXY_HTTP_PING_METHOD", "head"),
            ("PROXY_HTTP_PING_PATH", "/healthz"),
            ("PROXY_HTTP_PING_BODY", "ok"),
            ("PROXY_MAX_CONNECTIONS", "16"),
            ("PROXY_LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.listen_host, "127.0.0.1");
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.backend.to_string(), "backend.internal:7000");
        assert_eq!(config.idle_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.idle_check_interval, Duration::from_millis(250));
        assert_eq!(config.ping.method(), "HEAD");
        assert_eq!(config.ping.path(), "/healthz");
        assert_eq!(config.ping.body(), "ok");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_non_positive_idle_timeout_disables_watchdog() {
        for value in ["0", "-1", "-0.5"] {
            let config = load(&[("PROXY_IDLE_TIMEOUT_SECONDS", value)]).unwrap();
            assert_eq!(config.idle_timeout, None, "value {value}");
        }
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = load(&[("PROXY_LISTEN_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("PROXY_LISTEN_PORT"));

        let err = load(&[("PROXY_IDLE_TIMEOUT_SECONDS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("PROXY_IDLE_TIMEOUT_SECONDS"));

        assert!(load(&[("PROXY_BACKEND_PORT", "70000")]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_check_interval() {
        assert!(load(&[("PROXY_IDLE_CHECK_SECONDS", "0")]).is_err());
        assert!(load(&[("PROXY_IDLE_CHECK_SECONDS", "-1")]).is_err());
        assert!(load(&[("PROXY_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[test]
    fn test_listener_config() {
        let config = load(&[("PROXY_IDLE_TIMEOUT_SECONDS", "0")]).unwrap();
        let listener = config.listener_config("127.0.0.1:0".parse().unwrap());
        assert_eq!(listener.backend, config.backend);
        assert_eq!(listener.idle_timeout, None);
        assert_eq!(listener.max_connections, config.max_connections);
    }
}
