//! HTTP wire format for unary actions.
//!
//! ```text
//! POST /v1/actions/{kind}
//! <call metadata as request headers>
//!
//! <opaque payload bytes>
//!
//! 200 OK
//! {"results": ["<base64>", ...]}
//! ```
//!
//! Failures come back as a non-2xx status with an [`ErrorResponse`] body.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::ActionResult;

/// Route prefix under which actions are served.
pub const ACTIONS_PATH: &str = "/v1/actions";

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Base64-encoded result bodies, in order.
    pub results: Vec<String>,
}

impl ActionResponse {
    pub fn from_results(results: &[ActionResult]) -> Self {
        Self {
            results: results.iter().map(|r| STANDARD.encode(&r.body)).collect(),
        }
    }

    pub fn into_results(self) -> Result<Vec<ActionResult>, ActionError> {
        self.results
            .into_iter()
            .map(|encoded| {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map(|body| ActionResult {
                        body: Bytes::from(body),
                    })
                    .map_err(|e| ActionError::Decode(e.to_string()))
            })
            .collect()
    }
}

/// Error response body.
///
/// Problem-details bodies (`{"code", "detail", ...}`) decode too; extra
/// fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code (e.g. `invalid_delay_override`).
    pub code: String,
    /// Human-readable detail naming the offending field.
    #[serde(alias = "detail")]
    pub message: String,
}
