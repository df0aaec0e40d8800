//! Chat message and reaction entities
//!
//! Inbound chat messages carry an explicit `chatType` discriminant and are
//! validated before they reach the router.

use crate::error::DomainError;
use crate::events::EventKind;
use crate::value_objects::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// Message author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Sender {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message between exactly two users
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub chat_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub sender: Sender,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub receiver_id: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

/// A message to every participant of a group chat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub chat_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub sender: Sender,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

/// Inbound chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chatType")]
pub enum ChatMessage {
    #[serde(rename = "DM", alias = "DMs", alias = "Direct", alias = "direct")]
    Direct(DirectMessage),
    #[serde(rename = "Group", alias = "Groups", alias = "group")]
    Group(GroupMessage),
}

impl ChatMessage {
    /// Check the addressing fields
    pub fn validate_addressing(&self) -> Result<(), DomainError> {
        let result = match self {
            Self::Direct(m) => m.validate(),
            Self::Group(m) => m.validate(),
        };
        result.map_err(|e| DomainError::ValidationError(e.to_string()))
    }

    pub fn chat_id(&self) -> &str {
        match self {
            Self::Direct(m) => &m.chat_id,
            Self::Group(m) => &m.chat_id,
        }
    }

    pub fn sender_id(&self) -> UserId {
        match self {
            Self::Direct(m) => UserId::from(m.sender.id.as_str()),
            Self::Group(m) => UserId::from(m.sender.id.as_str()),
        }
    }

    /// Recipient resolution data for this message
    pub fn route(&self) -> MessageRoute {
        match self {
            Self::Direct(m) => MessageRoute::direct(
                m.chat_id.clone(),
                UserId::from(m.sender.id.as_str()),
                UserId::from(m.receiver_id.as_str()),
            ),
            Self::Group(m) => {
                MessageRoute::group(m.chat_id.clone(), UserId::from(m.sender.id.as_str()))
            }
        }
    }
}

/// How to address events about one stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRoute {
    Direct {
        chat_id: String,
        sender_id: UserId,
        receiver_id: UserId,
    },
    Group {
        chat_id: String,
        sender_id: UserId,
    },
}

impl MessageRoute {
    pub fn direct(chat_id: String, sender_id: UserId, receiver_id: UserId) -> Self {
        Self::Direct {
            chat_id,
            sender_id,
            receiver_id,
        }
    }

    pub fn group(chat_id: String, sender_id: UserId) -> Self {
        Self::Group { chat_id, sender_id }
    }

    pub fn chat_id(&self) -> &str {
        match self {
            Self::Direct { chat_id, .. } | Self::Group { chat_id, .. } => chat_id,
        }
    }

    /// Distinct sender and receiver of a direct message, `None` for groups
    pub fn direct_recipients(&self) -> Option<Vec<UserId>> {
        match self {
            Self::Direct {
                sender_id,
                receiver_id,
                ..
            } => {
                let mut users = vec![sender_id.clone()];
                if receiver_id != sender_id {
                    users.push(receiver_id.clone());
                }
                Some(users)
            }
            Self::Group { .. } => None,
        }
    }
}

/// Reaction toggle request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub message_id: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub user_id: String,
    #[serde(default)]
    pub reaction: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of toggling a reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    /// No previous reaction from this user
    Added,
    /// Same reaction sent again
    Removed,
    /// A different reaction replaced the previous one
    Updated,
}

impl ReactionChange {
    pub fn event_kind(self) -> EventKind {
        match self {
            Self::Added => EventKind::ReactionAdded,
            Self::Removed => EventKind::ReactionRemoved,
            Self::Updated => EventKind::ReactionUpdated,
        }
    }

    /// Decide the change from the previously stored reaction, if any
    pub fn between(previous: Option<&str>, next: &str) -> Self {
        match previous {
            None => Self::Added,
            Some(prev) if prev == next => Self::Removed,
            Some(_) => Self::Updated,
        }
    }
}
