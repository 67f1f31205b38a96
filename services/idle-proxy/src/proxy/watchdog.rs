//! Idle watchdog.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use super::connection::{CloseReason, ProxyConnection};

/// Watch a connection and close it once it has been idle for `idle_timeout`.
///
/// Checks every `check_interval`. Returns `true` when it closed the
/// connection. With no timeout it returns `false` immediately and never
/// closes anything. Also returns `false` if something else closes the
/// connection first.
pub async fn run_idle_watchdog(
    conn: &ProxyConnection,
    idle_timeout: Option<Duration>,
    check_interval: Duration,
) -> bool {
    let Some(idle_timeout) = idle_timeout else {
        return false;
    };

    let mut ticker = interval_at(Instant::now() + check_interval, check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if conn.is_closed() {
            return false;
        }

        let idle_for = conn.idle_for();
        if idle_for >= idle_timeout {
            info!(
                idle_secs = idle_for.as_secs_f64(),
                timeout_secs = idle_timeout.as_secs_f64(),
                "Idle timeout exceeded"
            );
            return conn.close(CloseReason::IdleTimeout);
        }
    }
}
