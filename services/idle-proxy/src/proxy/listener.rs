//! TCP listener and per-connection supervision.
//!
//! Every accepted client gets a fresh backend connection and three
//! concurrent activities: a pump in each direction and the idle watchdog.
//! The first of them to finish (or a proxy shutdown) ends the connection,
//! and both sockets are then reset.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

use super::connection::{abort_stream, CloseReason, ProxyConnection, Side};
use super::ping::PingConfig;
use super::pump::{pump, Direction};
use super::watchdog::run_idle_watchdog;

/// Client connections proxied at once before new ones are reset.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Silence allowed on a connection before the watchdog resets it.
pub const DEFAULT_IDLE_TIMEOUT: Option<Duration> = Some(Duration::from_secs(300));

pub const DEFAULT_IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Where connections are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub host: String,
    pub port: u16,
}

impl BackendTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything a [`Listener`] needs to accept and proxy connections.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    /// Dialled once per accepted client.
    pub backend: BackendTarget,
    pub max_connections: usize,
    /// Idle timeout for connections. `None` disables the watchdog.
    pub idle_timeout: Option<Duration>,
    /// How often the watchdog checks for idleness.
    pub idle_check_interval: Duration,
    /// HTTP ping interception.
    pub ping: PingConfig,
}

impl ListenerConfig {
    /// Config with the proxy defaults for everything but the addresses.
    pub fn new(bind_addr: SocketAddr, backend: BackendTarget) -> Self {
        Self {
            bind_addr,
            backend,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_check_interval: DEFAULT_IDLE_CHECK_INTERVAL,
            ping: PingConfig::default(),
        }
    }
}

/// Counters kept by a listener. All loads and stores are relaxed.
///
/// Every closed connection bumps exactly one of the per-reason counters
/// (`client_closes` through `shutdown_closes`); connections that never
/// reach a backend only bump `backend_failed`.
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub connections_accepted: AtomicU64,
    /// Connection tasks still running.
    pub connections_active: AtomicU64,
    pub connections_closed: AtomicU64,
    /// Reset on accept because `max_connections` permits were taken.
    pub connections_rejected: AtomicU64,
    pub backend_connected: AtomicU64,
    pub backend_failed: AtomicU64,
    /// Client payload bytes written to the backend. Pings are not counted.
    pub bytes_to_backend: AtomicU64,
    pub bytes_from_backend: AtomicU64,
    /// Pings answered by the proxy itself.
    pub pings_answered: AtomicU64,
    /// Connections closed because the client ended its stream.
    pub client_closes: AtomicU64,
    /// Connections closed because the backend ended its stream.
    pub backend_closes: AtomicU64,
    /// Connections closed by the idle watchdog.
    pub idle_timeouts: AtomicU64,
    /// Connections closed by a read or write error.
    pub stream_errors: AtomicU64,
    /// Connections closed by proxy shutdown.
    pub shutdown_closes: AtomicU64,
}

impl ListenerStats {
    fn record_close(&self, reason: CloseReason) {
        let counter = match reason {
            CloseReason::ClientClosed => &self.client_closes,
            CloseReason::BackendClosed => &self.backend_closes,
            CloseReason::IdleTimeout => &self.idle_timeouts,
            CloseReason::StreamError => &self.stream_errors,
            CloseReason::ProxyShutdown => &self.shutdown_closes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection before proxying starts.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to backend {backend}: {source}")]
    BackendConnect {
        backend: BackendTarget,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What ended supervision of a connection.
#[derive(Debug)]
enum Finished {
    Pump(Direction, io::Result<()>),
    Watchdog,
    Latched,
    Shutdown,
}

/// Accepts clients and proxies each one to the backend.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    /// One permit per live connection.
    conn_semaphore: Arc<Semaphore>,
    /// Permits the semaphore was created with.
    conn_permits: u32,
    /// Flipped to `true` on shutdown.
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind the listening socket. Nothing is accepted until [`run`](Self::run).
    pub async fn bind(config: ListenerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            backend = %config.backend,
            max_connections = config.max_connections,
            idle_timeout_secs = config.idle_timeout.map(|t| t.as_secs_f64()),
            "Listener bound"
        );

        let (shutdown_tx, _) = watch::channel(false);
        let conn_permits = config
            .max_connections
            .min(Semaphore::MAX_PERMITS)
            .min(u32::MAX as usize);

        Ok(Self {
            conn_semaphore: Arc::new(Semaphore::new(conn_permits)),
            conn_permits: conn_permits as u32,
            listener,
            config,
            shutdown_tx,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Bound address; useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Number of connections currently being proxied.
    pub fn active_connections(&self) -> u64 {
        self.stats.connections_active.load(Ordering::Relaxed)
    }

    /// Stop accepting and close every live connection.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait until every connection task has finished.
    ///
    /// Resolves once all connection permits are back. Meant to be awaited
    /// after [`shutdown`](Self::shutdown); while it waits, new clients are
    /// rejected as over the limit.
    pub async fn drained(&self) {
        // Never closed, so this only resolves with the permits, which are
        // handed straight back.
        let _ = self.conn_semaphore.acquire_many(self.conn_permits).await;
    }

    /// Run the listener until [`shutdown`](Self::shutdown) is called.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Accepting connections");

        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let permit = match self.conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats
                                .connections_rejected
                                .fetch_add(1, Ordering::Relaxed);
                            warn!(
                                peer_addr = %peer_addr,
                                limit = self.config.max_connections,
                                "Connection limit reached, resetting client"
                            );
                            abort_stream(Side::Client, stream);
                            continue;
                        }
                    };

                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let listener = Arc::clone(&self);
                    let stats = Arc::clone(&self.stats);
                    let shutdown = self.shutdown_tx.subscribe();

                    tokio::spawn(
                        async move {
                            if let Err(e) = listener
                                .handle_connection(stream, peer_addr, shutdown)
                                .await
                            {
                                error!(error = %e, "Connection failed");
                            }

                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    // Back off on persistent errors (e.g. fd exhaustion)
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!(bind_addr = %local_addr, "Listener stopped");
        Ok(())
    }

    /// Proxy a single client until one side closes, it goes idle, or the
    /// proxy shuts down.
    async fn handle_connection(
        &self,
        client: TcpStream,
        peer_addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectionError> {
        info!(peer_addr = %peer_addr, "Client connected");

        let backend = match TcpStream::connect((
            self.config.backend.host.as_str(),
            self.config.backend.port,
        ))
        .await
        {
            Ok(stream) => {
                self.stats.backend_connected.fetch_add(1, Ordering::Relaxed);
                stream
            }
            Err(source) => {
                self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
                abort_stream(Side::Client, client);
                return Err(ConnectionError::BackendConnect {
                    backend: self.config.backend.clone(),
                    source,
                });
            }
        };
        debug!(backend = %self.config.backend, "Connected to backend");

        let (mut client_reader, client_writer) = client.into_split();
        let (mut backend_reader, backend_writer) = backend.into_split();
        let conn = ProxyConnection::new(peer_addr, client_writer, backend_writer);

        let ping = &self.config.ping;
        let stats = self.stats.as_ref();

        let finished = tokio::select! {
            result = pump(&conn, &mut client_reader, Direction::ClientToBackend, ping, stats) => {
                Finished::Pump(Direction::ClientToBackend, result)
            }
            result = pump(&conn, &mut backend_reader, Direction::BackendToClient, ping, stats) => {
                Finished::Pump(Direction::BackendToClient, result)
            }
            _ = run_idle_watchdog(&conn, self.config.idle_timeout, self.config.idle_check_interval),
                if self.config.idle_timeout.is_some() => Finished::Watchdog,
            _ = conn.closed() => Finished::Latched,
            _ = shutdown.wait_for(|stop| *stop) => Finished::Shutdown,
        };

        match finished {
            Finished::Pump(direction, Err(e)) => {
                warn!(side = %direction.source(), error = %e, "Stream error");
                conn.close(CloseReason::StreamError);
            }
            Finished::Shutdown => {
                conn.close(CloseReason::ProxyShutdown);
            }
            Finished::Pump(_, Ok(())) | Finished::Watchdog | Finished::Latched => {}
        }

        // Everything that ends supervision latches first, so this only
        // falls back to the teardown reason.
        let reason = conn.close_reason().unwrap_or(CloseReason::ProxyShutdown);
        self.stats.record_close(reason);

        debug!(
            reason = %reason,
            lifetime_secs = conn.lifetime().as_secs_f64(),
            "Releasing connection"
        );
        conn.release(client_reader, backend_reader);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ListenerConfig {
        ListenerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            BackendTarget::new("127.0.0.1", 9000),
        )
    }

    #[test]
    fn test_listener_config_default() {
        let config = config();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.idle_check_interval, Duration::from_secs(1));
        assert_eq!(config.ping, PingConfig::default());
    }

    #[test]
    fn test_backend_target_display() {
        assert_eq!(
            BackendTarget::new("backend.internal", 8080).to_string(),
            "backend.internal:8080"
        );
    }

    #[test]
    fn test_record_close() {
        let stats = ListenerStats::default();
        stats.record_close(CloseReason::IdleTimeout);
        stats.record_close(CloseReason::IdleTimeout);
        stats.record_close(CloseReason::ClientClosed);

        assert_eq!(stats.idle_timeouts.load(Ordering::Relaxed), 2);
        assert_eq!(stats.client_closes.load(Ordering::Relaxed), 1);
        assert_eq!(stats.backend_closes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let listener = Arc::new(Listener::bind(config()).await.unwrap());
        let handle = tokio::spawn(Arc::clone(&listener).run());

        listener.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drained_waits_for_every_permit() {
        let mut config = config();
        config.max_connections = 4;
        let listener = Listener::bind(config).await.unwrap();

        tokio::time::timeout(Duration::from_millis(100), listener.drained())
            .await
            .expect("no connections, should drain at once");

        let permit = Arc::clone(&listener.conn_semaphore)
            .try_acquire_owned()
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), listener.drained())
                .await
                .is_err()
        );

        drop(permit);
        tokio::time::timeout(Duration::from_millis(100), listener.drained())
            .await
            .unwrap();
        assert_eq!(listener.conn_semaphore.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_before_run() {
        let listener = Arc::new(Listener::bind(config()).await.unwrap());
        listener.shutdown();

        tokio::time::timeout(Duration::from_secs(1), Arc::clone(&listener).run())
            .await
            .unwrap()
            .unwrap();
    }
}
