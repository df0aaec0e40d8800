//! Client event names
//!
//! Every event a client may send. Anything else is answered with a
//! `chatError` and does not close the connection.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEvent {
    // Session
    Register,
    Activity,
    SubscribeToUser,
    GetRoomMembers,
    JoinChat,
    LeaveChat,

    // Chat
    ChatMessage,
    AddChat,
    AddReaction,
    UpdateConversation,
    Typing,
    StopTyping,

    // Feed
    NewPost,
    UpdatePost,
    DeletePost,
    NewComment,
    Follow,
    Unfollow,

    // Calls
    CallInvite,
    CallAnswer,
    CallEnd,
    WebrtcOffer,
    WebrtcAnswer,
    WebrtcCandidate,

    // Legacy signaling
    Offer,
    Answer,
    Candidate,
    Hangup,
    JoinRoom,
}

impl InboundEvent {
    pub const ALL: [Self; 29] = [
        Self::Register,
        Self::Activity,
        Self::SubscribeToUser,
        Self::GetRoomMembers,
        Self::JoinChat,
        Self::LeaveChat,
        Self::ChatMessage,
        Self::AddChat,
        Self::AddReaction,
        Self::UpdateConversation,
        Self::Typing,
        Self::StopTyping,
        Self::NewPost,
        Self::UpdatePost,
        Self::DeletePost,
        Self::NewComment,
        Self::Follow,
        Self::Unfollow,
        Self::CallInvite,
        Self::CallAnswer,
        Self::CallEnd,
        Self::WebrtcOffer,
        Self::WebrtcAnswer,
        Self::WebrtcCandidate,
        Self::Offer,
        Self::Answer,
        Self::Candidate,
        Self::Hangup,
        Self::JoinRoom,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Activity => "activity",
            Self::SubscribeToUser => "subscribeToUser",
            Self::GetRoomMembers => "getRoomMembers",
            Self::JoinChat => "joinChat",
            Self::LeaveChat => "leaveChat",
            Self::ChatMessage => "chatMessage",
            Self::AddChat => "addChat",
            Self::AddReaction => "addReaction",
            Self::UpdateConversation => "updateConversation",
            Self::Typing => "typing",
            Self::StopTyping => "stopTyping",
            Self::NewPost => "newPost",
            Self::UpdatePost => "updatePost",
            Self::DeletePost => "deletePost",
            Self::NewComment => "newComment",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::CallInvite => "call:invite",
            Self::CallAnswer => "call:answer",
            Self::CallEnd => "call:end",
            Self::WebrtcOffer => "webrtc:offer",
            Self::WebrtcAnswer => "webrtc:answer",
            Self::WebrtcCandidate => "webrtc:candidate",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Hangup => "hangup",
            Self::JoinRoom => "join-room",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }

    /// Events served by the legacy room-based signaling path
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(
            self,
            Self::Offer | Self::Answer | Self::Candidate | Self::Hangup | Self::JoinRoom
        )
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
