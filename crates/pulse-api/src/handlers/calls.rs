//! Call registry queries
//!
//! Every response is built from a snapshot; nothing here mutates a call.

use axum::{
    extract::{Path, State},
    Json,
};
use pulse_core::{CallSession, CallStats, UserId};
use serde::Serialize;

use crate::response::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCallsResponse {
    pub user_id: UserId,
    pub active_calls: Vec<CallSession>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCallsResponse {
    pub active_calls: Vec<CallSession>,
    pub count: usize,
}

/// GET /calls/:call_id
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> ApiResult<Json<CallSession>> {
    state
        .service_context()
        .calls()
        .get(&call_id)
        .map(Json)
        .ok_or(ApiError::CallNotFound)
}

/// GET /calls/user/:user_id/active
pub async fn get_user_active(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserCallsResponse>> {
    let user_id = UserId::parse(&user_id).ok_or_else(|| ApiError::invalid_path("userId"))?;
    let active_calls = state.service_context().calls().active_for_user(&user_id);

    Ok(Json(UserCallsResponse {
        user_id,
        active_calls,
    }))
}

/// GET /calls/admin/active
pub async fn get_all_active(State(state): State<AppState>) -> Json<ActiveCallsResponse> {
    let active_calls = state.service_context().calls().all_active();
    Json(ActiveCallsResponse {
        count: active_calls.len(),
        active_calls,
    })
}

/// GET /calls/stats/overview
pub async fn get_stats(State(state): State<AppState>) -> Json<CallStats> {
    Json(state.service_context().calls().stats())
}
