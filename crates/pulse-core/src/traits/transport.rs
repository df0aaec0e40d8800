//! Transport seam
//!
//! The gateway owns the physical connections; everything else reaches them
//! through rooms. Emit operations return the number of connections written.

use async_trait::async_trait;
use serde_json::Value;

use crate::value_objects::{Room, UserId};

/// Outcome of pushing one event to every binding of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserPush {
    /// Bindings that accepted the event
    pub delivered: usize,
    /// Bindings that could not take it in time
    pub missed: usize,
}

impl UserPush {
    /// Every binding took the event and there was at least one
    pub fn is_complete(&self) -> bool {
        self.delivered > 0 && self.missed == 0
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Push an event to every connection in `room`
    async fn emit(&self, room: &Room, event: &str, payload: &Value) -> usize;

    /// Push an event to every connection in `room` except `connection_id`
    async fn emit_except(
        &self,
        room: &Room,
        connection_id: &str,
        event: &str,
        payload: &Value,
    ) -> usize;

    /// Push an event that must not be lost to every binding of `user_id`
    ///
    /// Unlike room emits this waits a bounded time for buffer space. A
    /// binding that still cannot take the event is counted as missed and
    /// gets closed so that it reconnects and replays its mailbox.
    async fn push_to_user(&self, user_id: &UserId, event: &str, payload: &Value) -> UserPush;

    /// Push an event to every open connection
    async fn broadcast(&self, event: &str, payload: &Value) -> usize;

    /// Add every binding of `user_id` to `room`
    async fn join_user(&self, room: &Room, user_id: &UserId) -> usize;

    /// Remove every connection from `room`
    async fn dissolve(&self, room: &Room);
}
