//! netfault idle proxy
//!
//! TCP proxy for exercising client behavior around idle connections.
//!
//! This service:
//! - Forwards every client connection to a single backend
//! - Resets connections with no traffic for the idle timeout
//! - Answers HTTP pings locally without touching the backend

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use netfault_idle_proxy::{Config, Listener};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long to wait for connections to finish tearing down on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to PROXY_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting netfault idle proxy");
    info!(
        listen = %format!("{}:{}", config.listen_host, config.listen_port),
        backend = %config.backend,
        idle_timeout_secs = config.idle_timeout.map(|t| t.as_secs_f64()),
        idle_check_secs = config.idle_check_interval.as_secs_f64(),
        ping_method = config.ping.method(),
        ping_path = config.ping.path(),
        "Configuration loaded"
    );

    let bind_addr = resolve_bind_addr(&config.listen_host, config.listen_port).await?;
    let listener = Arc::new(
        Listener::bind(config.listener_config(bind_addr))
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?,
    );

    let mut accept_loop = tokio::spawn(Arc::clone(&listener).run());

    tokio::select! {
        result = shutdown_signal() => {
            result.context("Failed to install signal handlers")?;
            info!("Shutdown signal received");
        }
        result = &mut accept_loop => {
            match result {
                Ok(Ok(())) => info!("Listener exited"),
                Ok(Err(e)) => error!(error = %e, "Listener error"),
                Err(e) => error!(error = %e, "Listener task failed"),
            }
        }
    }

    listener.shutdown();
    if !accept_loop.is_finished() {
        let _ = accept_loop.await;
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, listener.drained())
        .await
        .is_err()
    {
        warn!(
            active_connections = listener.active_connections(),
            "Connections still open after drain timeout"
        );
    }

    info!("Idle proxy stopped");
    Ok(())
}

async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve listen address {}:{}", host, port))?
        .next()
        .with_context(|| format!("No addresses for listen host {}", host))
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
