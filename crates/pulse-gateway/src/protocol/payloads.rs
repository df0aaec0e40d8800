//! Client payload definitions
//!
//! Typed views over the `data` field of inbound frames. Fields the core does
//! not interpret are left in the raw frame and relayed as received.

use serde::Deserialize;
use serde_json::Value;

/// A chat id sent either bare or as `{chatId}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChatRef {
    Id(String),
    Object {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}

impl ChatRef {
    pub fn chat_id(&self) -> Option<&str> {
        let id = match self {
            Self::Id(id) | Self::Object { chat_id: id } => id.trim(),
        };
        (!id.is_empty()).then_some(id)
    }
}

/// A user id sent either bare or as `{userId}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Object {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl UserRef {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { user_id: id } => id,
        }
    }
}

/// Payload for `typing` / `stopTyping`
#[derive(Debug, Clone, Deserialize)]
pub struct TypingPayload {
    /// Room name to relay to
    pub to: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRef {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewChatRef {
    #[serde(default)]
    pub participants: Vec<ParticipantRef>,
}

/// Payload for `addChat`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddChatPayload {
    #[serde(default)]
    pub chat: Option<NewChatRef>,
}

impl AddChatPayload {
    pub fn participant_ids(&self) -> Vec<&str> {
        self.chat
            .iter()
            .flat_map(|chat| chat.participants.iter())
            .map(|p| p.user_id.as_str())
            .collect()
    }
}

/// Payload for `updateConversation`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConversationPayload {
    pub id: String,
    pub updates: Value,
}

impl UpdateConversationPayload {
    /// Owner of the conversation settings
    pub fn owner(&self) -> Option<&str> {
        self.updates
            .get("userId")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowedDetails {
    #[serde(rename = "_id")]
    pub id: String,
}

/// Payload for `follow` / `unfollow`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowPayload {
    pub followed_details: FollowedDetails,
    #[serde(default)]
    pub follower_details: Value,
    #[serde(default)]
    pub time: Value,
}

/// Payload for `call:answer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCallPayload {
    pub call_id: String,
    #[serde(default)]
    pub accepted: bool,
}

/// Payload carrying a call id (`call:end`, `webrtc:*`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRef {
    pub call_id: String,
}

/// Payload for legacy `offer` / `answer` / `candidate`
#[derive(Debug, Clone, Deserialize)]
pub struct LegacySignalPayload {
    pub room: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_ref_forms() {
        let bare: ChatRef = serde_json::from_value(json!("c1")).unwrap();
        let object: ChatRef = serde_json::from_value(json!({ "chatId": "c1" })).unwrap();
        assert_eq!(bare.chat_id(), Some("c1"));
        assert_eq!(object.chat_id(), Some("c1"));

        let blank: ChatRef = serde_json::from_value(json!(" ")).unwrap();
        assert_eq!(blank.chat_id(), None);
    }

    #[test]
    fn test_add_chat_participants() {
        let payload: AddChatPayload = serde_json::from_value(json!({
            "chat": { "participants": [{ "userId": "a" }, { "userId": "b" }], "name": "x" },
            "extra": true
        }))
        .unwrap();
        assert_eq!(payload.participant_ids(), vec!["a", "b"]);

        let empty: AddChatPayload = serde_json::from_value(json!({})).unwrap();
        assert!(empty.participant_ids().is_empty());
    }

    #[test]
    fn test_conversation_owner() {
        let payload: UpdateConversationPayload = serde_json::from_value(json!({
            "id": "c1",
            "updates": { "userId": "a", "muted": true }
        }))
        .unwrap();
        assert_eq!(payload.owner(), Some("a"));
    }

    #[test]
    fn test_follow_payload() {
        let payload: FollowPayload = serde_json::from_value(json!({
            "followedDetails": { "_id": "b", "name": "B" },
            "followerDetails": { "_id": "a" },
            "time": 1
        }))
        .unwrap();
        assert_eq!(payload.followed_details.id, "b");
        assert_eq!(payload.follower_details["_id"], "a");
    }

    #[test]
    fn test_answer_defaults_to_decline() {
        let payload: AnswerCallPayload =
            serde_json::from_value(json!({ "callId": "call_1" })).unwrap();
        assert!(!payload.accepted);
    }
}
