//! # pulse-api
//!
//! Read-only HTTP surface over the call registry, plus liveness and
//! readiness probes. The router is mounted by the gateway process, which owns
//! the registry.

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;

pub use middleware::apply_middleware;
pub use response::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
