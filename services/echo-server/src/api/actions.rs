//! Action endpoint.
//!
//! `POST /v1/actions/{kind}` echoes the payload back after the configured
//! delay. Every action kind is handled the same way.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use netfault_action::{wire::ActionResponse, ActionResult};
use netfault_delay::DelayOverride;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use crate::state::AppState;

/// Echo result body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoPayload {
    /// The request payload, as text.
    pub message: String,
    pub metadata: EchoMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoMetadata {
    /// Seconds slept before responding.
    pub delay_applied_seconds: f64,
    /// Configured strategy kind. Header overrides do not change it.
    pub strategy: String,
    pub server_network: ServerNetwork,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNetwork {
    pub host: String,
    pub port: u16,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/{kind}", post(do_action))
}

async fn do_action(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    let message = String::from_utf8_lossy(&body).into_owned();
    info!(action = %kind, "Received action");
    info!(payload = %message, "Payload");

    let overrides = if state.allow_header_overrides() {
        parse_overrides(&headers)?
    } else {
        None
    };
    if let Some(overrides) = &overrides {
        info!(overrides = ?overrides, "Applying header overrides");
    }

    let delay_seconds = state.next_delay(overrides.as_ref()).await?;
    info!(delay_secs = delay_seconds, "Applying delay");
    tokio::time::sleep(Duration::try_from_secs_f64(delay_seconds).unwrap_or(Duration::MAX)).await;

    let payload = EchoPayload {
        message,
        metadata: EchoMetadata {
            delay_applied_seconds: delay_seconds,
            strategy: state.strategy().to_string(),
            server_network: ServerNetwork {
                host: state.host().to_string(),
                port: state.port(),
            },
        },
    };
    let result = serde_json::to_vec(&payload)
        .map_err(|e| ApiError::internal("encode_failed", e.to_string()))?;
    info!(response = %String::from_utf8_lossy(&result), "Sending echo response");

    Ok(Json(ActionResponse::from_results(&[ActionResult::new(
        result,
    )])))
}

/// Read `x-delay-*` overrides from request headers.
///
/// Header values that are not valid text are skipped.
fn parse_overrides(headers: &HeaderMap) -> Result<Option<DelayOverride>, ApiError> {
    let pairs = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)));
    Ok(DelayOverride::from_pairs(pairs)?)
}
