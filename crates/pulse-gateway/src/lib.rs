//! # pulse-gateway
//!
//! Real-time delivery gateway: WebSocket connections, event dispatch and the
//! transport used by presence, fan-out and calls.

pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use server::{create_app, create_gateway_state, run, GatewayState};
