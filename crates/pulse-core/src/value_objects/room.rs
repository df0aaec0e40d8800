//! Room naming
//!
//! A room is a named broadcast group inside the transport. Per-user rooms
//! reach every binding of one user, group rooms every binding that joined a
//! chat, and call rooms the legs of one call.

use super::UserId;
use std::fmt;

/// Room prefix for per-user rooms
pub const USER_ROOM_PREFIX: &str = "user:";
/// Room prefix for chat group rooms
pub const GROUP_ROOM_PREFIX: &str = "group:";
/// Room prefix for call signaling rooms
pub const CALL_ROOM_PREFIX: &str = "call:";

/// Transport room
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Every binding of one user
    User(UserId),
    /// Members of a chat group
    Group(String),
    /// Legs of a call
    Call(String),
    /// Free-form room joined through the legacy `join-room` event
    Named(String),
}

impl Room {
    #[must_use]
    pub fn user(user_id: &UserId) -> Self {
        Self::User(user_id.clone())
    }

    #[must_use]
    pub fn group(chat_id: impl Into<String>) -> Self {
        Self::Group(chat_id.into())
    }

    #[must_use]
    pub fn call(call_id: impl Into<String>) -> Self {
        Self::Call(call_id.into())
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Room name as seen by clients
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::User(id) => format!("{USER_ROOM_PREFIX}{id}"),
            Self::Group(id) => format!("{GROUP_ROOM_PREFIX}{id}"),
            Self::Call(id) => format!("{CALL_ROOM_PREFIX}{id}"),
            Self::Named(name) => name.clone(),
        }
    }

    /// Parse a room name back into a `Room`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some(id) = name.strip_prefix(USER_ROOM_PREFIX).and_then(UserId::parse) {
            return Self::User(id);
        }
        if let Some(id) = name.strip_prefix(GROUP_ROOM_PREFIX).filter(|s| !s.is_empty()) {
            return Self::Group(id.to_string());
        }
        if let Some(id) = name.strip_prefix(CALL_ROOM_PREFIX).filter(|s| !s.is_empty()) {
            return Self::Call(id.to_string());
        }
        Self::Named(name.to_string())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
