//! One-directional byte pumps.

use std::io;
use std::sync::atomic::Ordering;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::connection::{CloseReason, ProxyConnection, Side};
use super::listener::ListenerStats;
use super::ping::PingConfig;

/// Read buffer size for each pump.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Direction of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn source(&self) -> Side {
        match self {
            Direction::ClientToBackend => Side::Client,
            Direction::BackendToClient => Side::Backend,
        }
    }

    pub fn destination(&self) -> Side {
        match self {
            Direction::ClientToBackend => Side::Backend,
            Direction::BackendToClient => Side::Client,
        }
    }

    /// Close reason when the source reaches end of stream.
    pub fn eof_reason(&self) -> CloseReason {
        match self {
            Direction::ClientToBackend => CloseReason::ClientClosed,
            Direction::BackendToClient => CloseReason::BackendClosed,
        }
    }
}

/// Copy chunks from `source` to the opposite side until end of stream.
///
/// Every non-empty read refreshes the connection's activity clock. Client
/// chunks matching `ping` are answered on the client socket and dropped.
/// On end of stream the connection is latched closed with the matching
/// reason. Read and write errors are returned to the caller.
pub async fn pump<R>(
    conn: &ProxyConnection,
    source: &mut R,
    direction: Direction,
    ping: &PingConfig,
    stats: &ListenerStats,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            debug!(side = %direction.source(), "End of stream");
            conn.close(direction.eof_reason());
            return Ok(());
        }

        conn.mark_activity();
        let chunk = &buf[..n];

        if direction == Direction::ClientToBackend && ping.matches(chunk) {
            debug!(path = ping.path(), "Answering HTTP ping");
            conn.write_to(Side::Client, ping.response()).await?;
            stats.pings_answered.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        trace!(bytes = n, to = %direction.destination(), "Forwarding chunk");
        conn.write_to(direction.destination(), chunk).await?;

        let counter = match direction {
            Direction::ClientToBackend => &stats.bytes_to_backend,
            Direction::BackendToClient => &stats.bytes_from_backend,
        };
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
