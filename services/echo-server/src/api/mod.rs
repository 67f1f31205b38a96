//! HTTP API handlers and routing.

mod actions;
pub mod error;
mod health;

use axum::Router;
use netfault_action::wire::ACTIONS_PATH;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use actions::{EchoMetadata, EchoPayload, ServerNetwork};

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .merge(health::routes())
        // Action calls
        .nest(ACTIONS_PATH, actions::routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        // Application state
        .with_state(state)
}
