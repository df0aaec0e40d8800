//! Event names
//!
//! `EventKind` is the closed set of events that may be queued in a mailbox;
//! the same name is used when the event is pushed live, so a replayed entry
//! is indistinguishable from a live push. `TransportEvent` covers names that
//! only ever travel over a live connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Queueable event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Blog
    #[serde(rename = "newPost")]
    NewPost,
    #[serde(rename = "updatePost")]
    UpdatePost,
    #[serde(rename = "deletePost")]
    DeletePost,
    #[serde(rename = "newComment")]
    NewComment,

    // Chat
    #[serde(rename = "newChat")]
    NewChat,
    #[serde(rename = "newMessage")]
    NewMessage,
    #[serde(rename = "reactionAdded")]
    ReactionAdded,
    #[serde(rename = "reactionRemoved")]
    ReactionRemoved,
    #[serde(rename = "reactionUpdated")]
    ReactionUpdated,
    #[serde(rename = "conversationUpdated")]
    ConversationUpdated,
    #[serde(rename = "joinChat")]
    JoinChat,

    // Social
    #[serde(rename = "followNotification")]
    FollowNotification,

    // Calls
    #[serde(rename = "call:invite")]
    CallInvite,
    #[serde(rename = "call:answered")]
    CallAnswered,
    #[serde(rename = "call:connected")]
    CallConnected,
    #[serde(rename = "call:declined")]
    CallDeclined,
    #[serde(rename = "call:ended")]
    CallEnded,
    #[serde(rename = "webrtc:offer")]
    WebrtcOffer,
    #[serde(rename = "webrtc:answer")]
    WebrtcAnswer,
    #[serde(rename = "webrtc:candidate")]
    WebrtcCandidate,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 20] = [
        Self::NewPost,
        Self::UpdatePost,
        Self::DeletePost,
        Self::NewComment,
        Self::NewChat,
        Self::NewMessage,
        Self::ReactionAdded,
        Self::ReactionRemoved,
        Self::ReactionUpdated,
        Self::ConversationUpdated,
        Self::JoinChat,
        Self::FollowNotification,
        Self::CallInvite,
        Self::CallAnswered,
        Self::CallConnected,
        Self::CallDeclined,
        Self::CallEnded,
        Self::WebrtcOffer,
        Self::WebrtcAnswer,
        Self::WebrtcCandidate,
    ];

    /// Wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewPost => "newPost",
            Self::UpdatePost => "updatePost",
            Self::DeletePost => "deletePost",
            Self::NewComment => "newComment",
            Self::NewChat => "newChat",
            Self::NewMessage => "newMessage",
            Self::ReactionAdded => "reactionAdded",
            Self::ReactionRemoved => "reactionRemoved",
            Self::ReactionUpdated => "reactionUpdated",
            Self::ConversationUpdated => "conversationUpdated",
            Self::JoinChat => "joinChat",
            Self::FollowNotification => "followNotification",
            Self::CallInvite => "call:invite",
            Self::CallAnswered => "call:answered",
            Self::CallConnected => "call:connected",
            Self::CallDeclined => "call:declined",
            Self::CallEnded => "call:ended",
            Self::WebrtcOffer => "webrtc:offer",
            Self::WebrtcAnswer => "webrtc:answer",
            Self::WebrtcCandidate => "webrtc:candidate",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live-only event names, never written to a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    UserStatus,
    BatchUserStatus,
    UserTyping,
    UserStopTyping,
    RoomMembers,
    ChatError,
    CallInitiated,
    // Legacy signaling path
    Offer,
    Answer,
    Candidate,
    RemoteHangup,
    UserJoined,
}

impl TransportEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserStatus => "userStatus",
            Self::BatchUserStatus => "batchUserStatus",
            Self::UserTyping => "userTyping",
            Self::UserStopTyping => "userStopTyping",
            Self::RoomMembers => "roomMembers",
            Self::ChatError => "chatError",
            Self::CallInitiated => "call:initiated",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::RemoteHangup => "remote-hangup",
            Self::UserJoined => "user-joined",
        }
    }
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
