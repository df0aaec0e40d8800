//! Route definitions

use axum::{routing::get, Router};

use crate::handlers::{calls, health};
use crate::state::AppState;

/// Create the HTTP router: call queries and health probes
pub fn create_router() -> Router<AppState> {
    Router::new().merge(call_routes()).merge(health_routes())
}

/// Health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
}

/// Call registry snapshots
fn call_routes() -> Router<AppState> {
    Router::new()
        // Literal segments are matched before the `:call_id` capture
        .route("/calls/admin/active", get(calls::get_all_active))
        .route("/calls/stats/overview", get(calls::get_stats))
        .route("/calls/user/:user_id/active", get(calls::get_user_active))
        .route("/calls/:call_id", get(calls::get_call))
}
