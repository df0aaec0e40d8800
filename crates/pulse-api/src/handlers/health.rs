//! Health check handlers
//!
//! Endpoints for liveness and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: bool,
    pub directory: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub checks: ReadinessChecks,
}

/// Basic health check (liveness probe)
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check with dependency health
///
/// GET /health/ready
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store = state.service_context().store().ping().await.is_ok();
    let directory = state.service_context().directory().ping().await.is_ok();

    let ready = store && directory;
    if !ready {
        tracing::warn!(store, directory, "Readiness check failed");
    }

    let response = ReadinessResponse {
        status: if ready { "ready" } else { "unavailable" },
        timestamp: Utc::now().to_rfc3339(),
        checks: ReadinessChecks { store, directory },
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
