//! Error handling and display for the client.

use colored::Colorize;
use netfault_action::ActionError;
use netfault_delay::DelayError;
use thiserror::Error;

/// Client run errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid delay configuration: {0}")]
    Delay(#[from] DelayError),

    #[error(
        "Call {sequence}/{total} failed after {idle_secs:.3} seconds idle and \
         {in_flight_secs:.3} seconds in-flight: {source}"
    )]
    CallFailed {
        sequence: u32,
        total: u32,
        idle_secs: f64,
        in_flight_secs: f64,
        #[source]
        source: ActionError,
    },

    #[error("Call {sequence}/{total} returned a result that is not JSON: {message}")]
    InvalidResponse {
        sequence: u32,
        total: u32,
        message: String,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(client_err) = err.downcast_ref::<ClientError>() {
        match client_err {
            ClientError::CallFailed {
                source: ActionError::Network(_),
                ..
            } => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the echo server (or proxy) is reachable at the configured host and port."
                        .yellow()
                );
            }
            ClientError::CallFailed {
                source: ActionError::Rejected { status: 400, .. },
                ..
            } => {
                eprintln!(
                    "\n{}",
                    "Hint: The server rejected the x-delay-* overrides. Check the client delay block."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
