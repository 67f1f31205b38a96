//! Test harness for idle proxy integration tests.
//!
//! Provides helpers to spawn TCP backends and a proxy listener on loopback.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};

use netfault_idle_proxy::{BackendTarget, Listener, ListenerConfig, ListenerStats};

/// What a backend does with each accepted connection.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum BackendMode {
    /// Echo every byte back.
    Echo,
    /// Record bytes without replying.
    Record,
    /// Close immediately after accepting.
    Hangup,
}

#[allow(dead_code)]
pub struct TcpBackend {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicU64>,
    pub bytes_received: Arc<AtomicU64>,
    pub received: Arc<Mutex<Vec<u8>>>,
    /// One message per backend connection when its peer goes away.
    closed_rx: Mutex<mpsc::UnboundedReceiver<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[allow(dead_code)]
impl TcpBackend {
    pub async fn spawn(mode: BackendMode) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicU64::new(0));
        let bytes_received = Arc::new(AtomicU64::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        let conn_clone = Arc::clone(&connections);
        let bytes_clone = Arc::clone(&bytes_received);
        let received_clone = Arc::clone(&received);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((mut stream, _)) => {
                                conn_clone.fetch_add(1, Ordering::Relaxed);
                                if matches!(mode, BackendMode::Hangup) {
                                    drop(stream);
                                    continue;
                                }

                                let bytes = Arc::clone(&bytes_clone);
                                let received = Arc::clone(&received_clone);
                                let closed = closed_tx.clone();
                                tokio::spawn(async move {
                                    let mut buf = vec![0u8; 8192];
                                    loop {
                                        match stream.read(&mut buf).await {
                                            Ok(0) | Err(_) => break,
                                            Ok(n) => {
                                                bytes.fetch_add(n as u64, Ordering::Relaxed);
                                                received.lock().await.extend_from_slice(&buf[..n]);
                                                if matches!(mode, BackendMode::Echo)
                                                    && stream.write_all(&buf[..n]).await.is_err()
                                                {
                                                    break;
                                                }
                                            }
                                        }
                                    }
                                    let _ = closed.send(());
                                });
                            }
                            Err(_) => break,
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            bytes_received,
            received,
            closed_rx: Mutex::new(closed_rx),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Wait for a backend connection to observe its peer closing.
    pub async fn wait_peer_closed(&self, within: Duration) -> bool {
        let mut rx = self.closed_rx.lock().await;
        matches!(tokio::time::timeout(within, rx.recv()).await, Ok(Some(())))
    }
}

impl Drop for TcpBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// An unused loopback port.
#[allow(dead_code)]
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub struct ProxyHandle {
    pub listen_addr: SocketAddr,
    pub listener: Arc<Listener>,
}

#[allow(dead_code)]
impl ProxyHandle {
    pub fn config(backend_port: u16) -> ListenerConfig {
        let mut config = ListenerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            BackendTarget::new("127.0.0.1", backend_port),
        );
        config.idle_timeout = Some(Duration::from_secs(30));
        config.idle_check_interval = Duration::from_millis(50);
        config
    }

    pub async fn spawn(config: ListenerConfig) -> io::Result<Self> {
        let listener = Arc::new(Listener::bind(config).await?);
        let listen_addr = listener.local_addr()?;

        tokio::spawn(Arc::clone(&listener).run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            listen_addr,
            listener,
        })
    }

    pub fn stats(&self) -> &ListenerStats {
        self.listener.stats()
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.listen_addr).await.unwrap()
    }

    /// Poll until `check` holds or `within` elapses.
    pub async fn wait_for<F>(&self, within: Duration, check: F) -> bool
    where
        F: Fn(&ListenerStats) -> bool,
    {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if check(self.stats()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self.stats())
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.listener.shutdown();
    }
}

/// Read until the peer closes or resets. Returns whatever arrived first.
#[allow(dead_code)]
pub async fn read_until_closed(stream: &mut TcpStream, within: Duration) -> Option<Vec<u8>> {
    tokio::time::timeout(within, async {
        let mut data = Vec::new();
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return data,
                Ok(n) => data.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await
    .ok()
}

/// Read exactly `len` bytes.
#[allow(dead_code)]
pub async fn read_exact_within(
    stream: &mut TcpStream,
    len: usize,
    within: Duration,
) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(within, stream.read_exact(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;
    Ok(buf)
}
