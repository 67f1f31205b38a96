//! Errors returned by action transports.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    /// The endpoint URL could not be used as a base.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A metadata key or value is not a legal header.
    #[error("invalid call metadata '{0}'")]
    InvalidMetadata(String),

    /// The server answered with a non-success status.
    #[error("action rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body did not decode.
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ActionError {
    /// Create a rejection from response details.
    pub fn rejected(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// True if the server refused the call because of its metadata or
    /// payload, as opposed to a transport failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ActionError::Rejected { status, .. } if (400..500).contains(status))
    }
}
