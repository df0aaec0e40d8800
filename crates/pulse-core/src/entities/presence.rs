//! Presence entities

use crate::value_objects::UserId;
use serde::{Deserialize, Serialize};

/// Reachability of a logical user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    #[default]
    Offline,
}

impl UserStatus {
    #[must_use]
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Snapshot of one user's presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub online: bool,
    /// Epoch milliseconds of the last recorded activity, if any
    pub last_active_at: Option<i64>,
}

/// A presence transition, as carried by `userStatus` and `batchUserStatus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub user_id: UserId,
    pub status: UserStatus,
}

impl StatusChange {
    #[must_use]
    pub fn new(user_id: UserId, status: UserStatus) -> Self {
        Self { user_id, status }
    }
}
