//! # pulse-service
//!
//! Application layer: per-recipient fan-out, the call session registry and
//! the dependency container shared by the gateway and the HTTP surface.

pub mod services;

pub use services::{
    CallError, CallSessionRegistry, Delivery, FanoutRouter, InviteRequest, RouteReport,
    ServiceContext, ServiceContextBuilder, ServiceError, ServiceResult, SignalKind,
};
