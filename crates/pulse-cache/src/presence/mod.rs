//! Presence tracking and status batching

mod batcher;
mod tracker;

pub use batcher::{StatusBatcher, DEFAULT_BATCH_CAPACITY, DEFAULT_FLUSH_INTERVAL};
pub use tracker::{PresenceTracker, Transition, DEFAULT_USER_TIMEOUT_SECS, ONLINE_USERS_KEY};
