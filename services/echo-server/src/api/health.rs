//! Health endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// `GET /healthz` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    /// Configured delay strategy kind.
    pub strategy: String,
    pub allow_header_overrides: bool,
    /// RFC 3339, UTC.
    pub checked_at: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/livez", get(|| async { StatusCode::OK }))
}

async fn healthz(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        strategy: state.strategy().to_string(),
        allow_header_overrides: state.allow_header_overrides(),
        checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
