//! Call session entity - one call's participants and lifecycle

use crate::value_objects::{generate_call_id, now_millis, Room, UserId};
use serde::{Deserialize, Serialize};

/// Media type of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Audio,
    Video,
}

/// Addressing context of a call or message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChatType {
    #[default]
    #[serde(rename = "DM", alias = "DMs", alias = "Direct", alias = "direct")]
    Direct,
    #[serde(rename = "Group", alias = "Groups", alias = "group")]
    Group,
}

impl ChatType {
    #[inline]
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group)
    }
}

/// Call lifecycle state
///
/// `Ringing` moves to `Connected` or `Declined`; `Connected` moves to `Ended`.
/// `Declined` and `Ended` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Connected,
    Declined,
    Ended,
}

impl CallStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Ended)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Connected => "connected",
            Self::Declined => "declined",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub call_id: String,
    pub room_id: String,
    pub caller_id: UserId,
    /// Ordered, duplicate free
    pub participants: Vec<UserId>,
    pub call_type: CallType,
    pub chat_type: ChatType,
    pub status: CallStatus,
    /// Epoch milliseconds
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl CallSession {
    /// Start a new ringing session with the caller as its only participant
    pub fn ringing(
        caller_id: UserId,
        room_id: impl Into<String>,
        call_type: CallType,
        chat_type: ChatType,
    ) -> Self {
        Self {
            call_id: generate_call_id(),
            room_id: room_id.into(),
            participants: vec![caller_id.clone()],
            caller_id,
            call_type,
            chat_type,
            status: CallStatus::Ringing,
            start_time: now_millis(),
            end_time: None,
        }
    }

    /// Room used for signaling between the legs of this call
    pub fn signaling_room(&self) -> Room {
        Room::call(&self.call_id)
    }

    #[inline]
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains(user_id)
    }

    /// Append a participant, keeping the list duplicate free
    pub fn add_participant(&mut self, user_id: UserId) -> bool {
        if self.has_participant(&user_id) {
            return false;
        }
        self.participants.push(user_id);
        true
    }

    /// Whether `user_id` may accept this call in its current state
    pub fn accepts_answer_from(&self, user_id: &UserId) -> bool {
        match self.status {
            CallStatus::Ringing => true,
            CallStatus::Connected => self.chat_type.is_group() && !self.has_participant(user_id),
            CallStatus::Declined | CallStatus::Ended => false,
        }
    }

    /// Mark the session terminal with the given status
    pub fn finish(&mut self, status: CallStatus) {
        self.status = status;
        self.end_time = Some(now_millis());
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Aggregate counts over the live sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStats {
    pub total_active: usize,
    pub audio_calls: usize,
    pub video_calls: usize,
    pub ringing: usize,
    pub connected: usize,
}

impl CallStats {
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a CallSession>) -> Self {
        sessions
            .into_iter()
            .filter(|s| s.is_active())
            .fold(Self::default(), |mut stats, s| {
                stats.total_active += 1;
                match s.call_type {
                    CallType::Audio => stats.audio_calls += 1,
                    CallType::Video => stats.video_calls += 1,
                }
                match s.status {
                    CallStatus::Ringing => stats.ringing += 1,
                    CallStatus::Connected => stats.connected += 1,
                    CallStatus::Declined | CallStatus::Ended => {}
                }
                stats
            })
    }
}
