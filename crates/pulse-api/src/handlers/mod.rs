//! Route handlers

pub mod calls;
pub mod health;
