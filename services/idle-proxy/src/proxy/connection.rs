//! Per-connection state shared by the pumps and the idle watchdog.
//!
//! A [`ProxyConnection`] owns the write halves of both sockets. The read
//! halves stay with the supervisor, which lends them to the pumps and hands
//! them back to [`ProxyConnection::release`] for the abortive teardown.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// Which socket of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Backend,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Backend => "backend",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection was closed. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client ended its stream.
    ClientClosed,
    /// The backend ended its stream.
    BackendClosed,
    /// No bytes in either direction for the idle timeout.
    IdleTimeout,
    /// A read or write failed.
    StreamError,
    /// Supervisor teardown or process shutdown.
    ProxyShutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client closed",
            CloseReason::BackendClosed => "backend closed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::StreamError => "stream error",
            CloseReason::ProxyShutdown => "proxy shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic last-activity tracker.
///
/// Stores the offset of the last activity from `opened_at` in microseconds
/// so it can be stamped from any task without a lock.
#[derive(Debug)]
pub struct ActivityClock {
    opened_at: Instant,
    last_activity_us: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            opened_at: Instant::now(),
            last_activity_us: AtomicU64::new(0),
        }
    }

    /// Record activity now.
    pub fn mark(&self) {
        let offset = self.opened_at.elapsed().as_micros() as u64;
        self.last_activity_us.fetch_max(offset, Ordering::Relaxed);
    }

    /// Time since the last recorded activity (or since opening).
    pub fn idle_for(&self) -> Duration {
        let last = self.opened_at
            + Duration::from_micros(self.last_activity_us.load(Ordering::Relaxed));
        Instant::now().saturating_duration_since(last)
    }

    /// Time since the connection was opened.
    pub fn lifetime(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A proxied client/backend socket pair.
pub struct ProxyConnection {
    peer_addr: SocketAddr,
    /// Shared by both pumps: backend data and ping responses both go here.
    client_writer: Mutex<OwnedWriteHalf>,
    backend_writer: Mutex<OwnedWriteHalf>,
    activity: ActivityClock,
    closed: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    closed_tx: watch::Sender<bool>,
}

impl ProxyConnection {
    pub fn new(
        peer_addr: SocketAddr,
        client_writer: OwnedWriteHalf,
        backend_writer: OwnedWriteHalf,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            peer_addr,
            client_writer: Mutex::new(client_writer),
            backend_writer: Mutex::new(backend_writer),
            activity: ActivityClock::new(),
            closed: AtomicBool::new(false),
            close_reason: OnceLock::new(),
            closed_tx,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn mark_activity(&self) {
        self.activity.mark();
    }

    pub fn idle_for(&self) -> Duration {
        self.activity.idle_for()
    }

    pub fn lifetime(&self) -> Duration {
        self.activity.lifetime()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The reason recorded by the first close, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Latch the connection closed.
    ///
    /// Only the first caller wins; it records the reason, logs it, and wakes
    /// [`closed`](Self::closed) waiters. Returns whether this call closed it.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let _ = self.close_reason.set(reason);
        info!(
            reason = %reason,
            idle_secs = self.idle_for().as_secs_f64(),
            lifetime_secs = self.lifetime().as_secs_f64(),
            "Closing connection"
        );
        self.closed_tx.send_replace(true);
        true
    }

    /// Resolve once the connection has been latched closed.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so this only ends when the latch fires.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Write a whole chunk to one side and flush it.
    pub async fn write_to(&self, side: Side, data: &[u8]) -> io::Result<()> {
        let mut writer = match side {
            Side::Client => self.client_writer.lock().await,
            Side::Backend => self.backend_writer.lock().await,
        };
        writer.write_all(data).await?;
        writer.flush().await
    }

    /// Abortively close both sockets and drop them.
    ///
    /// Latches the connection closed first (a no-op if something already
    /// did). Each socket gets `SO_LINGER` of zero so the kernel discards
    /// unsent data and resets the peer instead of lingering half-closed.
    pub fn release(self, client_reader: OwnedReadHalf, backend_reader: OwnedReadHalf) {
        self.close(CloseReason::ProxyShutdown);

        let Self {
            client_writer,
            backend_writer,
            ..
        } = self;

        for (side, reader, writer) in [
            (Side::Client, client_reader, client_writer.into_inner()),
            (Side::Backend, backend_reader, backend_writer.into_inner()),
        ] {
            match reader.reunite(writer) {
                Ok(stream) => abort_stream(side, stream),
                Err(e) => debug!(side = %side, error = %e, "Socket halves did not reunite"),
            }
        }
    }
}

impl fmt::Debug for ProxyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConnection")
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .field("close_reason", &self.close_reason())
            .finish_non_exhaustive()
    }
}

/// Close a socket with a reset instead of an orderly shutdown.
///
/// Failures are logged and otherwise ignored.
pub fn abort_stream(side: Side, stream: TcpStream) {
    if let Err(e) = SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
        debug!(side = %side, error = %e, "Failed to set SO_LINGER");
    }
    drop(stream);
}
