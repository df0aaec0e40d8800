//! Integration test utilities for the delivery gateway
//!
//! This crate provides helpers for running end-to-end tests against
//! the socket route and the HTTP surface.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
