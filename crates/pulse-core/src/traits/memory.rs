//! In-memory collaborators
//!
//! `InMemoryDirectory` backs the standalone mode (no database configured) and
//! the test suites. `RecordingTransport` stands in for the gateway in tests of
//! the layers above it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{
    ChatRepository, IdentityResolver, MembershipDirectory, RepoResult, Transport, UserPush,
};
use crate::entities::{ChatMessage, ChatType, MessageRoute, Reaction, ReactionChange};
use crate::error::DomainError;
use crate::value_objects::{Room, UserId};

#[derive(Debug, Clone)]
struct ChatRecord {
    chat_type: ChatType,
    participants: Vec<UserId>,
}

/// Directory and chat store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    /// When set, only registered users resolve
    strict: bool,
    users: RwLock<HashSet<UserId>>,
    chats: RwLock<HashMap<String, ChatRecord>>,
    messages: RwLock<HashMap<String, MessageRoute>>,
    reactions: RwLock<HashMap<(String, String), String>>,
    conversations: RwLock<HashMap<(String, UserId), Value>>,
    next_message: AtomicU64,
}

impl InMemoryDirectory {
    /// Directory that accepts any non-blank identity
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that only accepts registered users
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn add_user(&self, user_id: impl Into<UserId>) {
        self.users.write().insert(user_id.into());
    }

    /// Register a chat and its participants
    pub fn add_chat<I, U>(&self, chat_id: impl Into<String>, chat_type: ChatType, participants: I)
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        let mut seen = HashSet::new();
        let participants = participants
            .into_iter()
            .map(Into::into)
            .filter(|u: &UserId| seen.insert(u.clone()))
            .collect();
        self.chats.write().insert(
            chat_id.into(),
            ChatRecord {
                chat_type,
                participants,
            },
        );
    }

    /// Register an already stored message
    pub fn add_message(&self, message_id: impl Into<String>, route: MessageRoute) {
        self.messages.write().insert(message_id.into(), route);
    }

    /// Current reaction of `user_id` on a message
    pub fn reaction_of(&self, message_id: &str, user_id: &str) -> Option<String> {
        self.reactions
            .read()
            .get(&(message_id.to_string(), user_id.to_string()))
            .cloned()
    }

    /// Settings stored by `update_conversation`
    pub fn conversation(&self, chat_id: &str, user_id: &UserId) -> Option<Value> {
        self.conversations
            .read()
            .get(&(chat_id.to_string(), user_id.clone()))
            .cloned()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }
}

#[async_trait]
impl IdentityResolver for InMemoryDirectory {
    async fn resolve(&self, raw: &str) -> RepoResult<Option<UserId>> {
        let Some(user_id) = UserId::parse(raw) else {
            return Ok(None);
        };
        if self.strict && !self.users.read().contains(&user_id) {
            return Ok(None);
        }
        Ok(Some(user_id))
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryDirectory {
    async fn groups_for_user(&self, user_id: &UserId) -> RepoResult<Vec<String>> {
        let mut groups: Vec<String> = self
            .chats
            .read()
            .iter()
            .filter(|(_, chat)| chat.chat_type.is_group() && chat.participants.contains(user_id))
            .map(|(id, _)| id.clone())
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn chat_participants(&self, chat_id: &str) -> RepoResult<Vec<UserId>> {
        Ok(self
            .chats
            .read()
            .get(chat_id)
            .map(|chat| chat.participants.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChatRepository for InMemoryDirectory {
    async fn save_message(&self, message: &ChatMessage) -> RepoResult<Value> {
        let id = format!("msg_{}", self.next_message.fetch_add(1, Ordering::Relaxed) + 1);
        self.messages.write().insert(id.clone(), message.route());

        let mut stored = serde_json::to_value(message)
            .map_err(|e| DomainError::InternalError(e.to_string()))?;
        if let Some(object) = stored.as_object_mut() {
            object.insert("_id".to_string(), Value::String(id));
        }
        Ok(stored)
    }

    async fn message_route(&self, message_id: &str) -> RepoResult<Option<MessageRoute>> {
        Ok(self.messages.read().get(message_id).cloned())
    }

    async fn toggle_reaction(&self, reaction: &Reaction) -> RepoResult<ReactionChange> {
        if !self.messages.read().contains_key(&reaction.message_id) {
            return Err(DomainError::MessageNotFound(reaction.message_id.clone()));
        }

        let key = (reaction.message_id.clone(), reaction.user_id.clone());
        let mut reactions = self.reactions.write();
        let change = ReactionChange::between(
            reactions.get(&key).map(String::as_str),
            &reaction.reaction,
        );
        match change {
            ReactionChange::Removed => {
                reactions.remove(&key);
            }
            ReactionChange::Added | ReactionChange::Updated => {
                reactions.insert(key, reaction.reaction.clone());
            }
        }
        Ok(change)
    }

    async fn update_conversation(
        &self,
        chat_id: &str,
        user_id: &UserId,
        updates: &Value,
    ) -> RepoResult<()> {
        let mut conversations = self.conversations.write();
        let entry = conversations
            .entry((chat_id.to_string(), user_id.clone()))
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let (Some(target), Some(source)) = (entry.as_object_mut(), updates.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }
}

/// One write observed by `RecordingTransport`
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    /// `None` for broadcasts
    pub room: Option<Room>,
    pub event: String,
    pub payload: Value,
    pub delivered: usize,
}

/// Transport double that counts bindings per user and records every emit
#[derive(Debug, Default)]
pub struct RecordingTransport {
    bindings: Mutex<HashMap<UserId, usize>>,
    lagging: Mutex<HashMap<UserId, usize>>,
    rooms: Mutex<HashMap<Room, HashSet<UserId>>>,
    emitted: Mutex<Vec<Emitted>>,
    dissolved: Mutex<Vec<Room>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one more binding for `user_id`
    pub fn connect(&self, user_id: &UserId) {
        *self.bindings.lock().entry(user_id.clone()).or_default() += 1;
    }

    /// Close one binding of `user_id`
    pub fn disconnect(&self, user_id: &UserId) {
        let mut bindings = self.bindings.lock();
        if let Some(count) = bindings.get_mut(user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                bindings.remove(user_id);
            }
        }
    }

    /// Make `count` bindings of `user_id` miss guaranteed pushes
    pub fn lag(&self, user_id: &UserId, count: usize) {
        self.lagging.lock().insert(user_id.clone(), count);
    }

    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().clone()
    }

    /// Emits with the given event name
    pub fn named(&self, event: &str) -> Vec<Emitted> {
        self.emitted
            .lock()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }

    /// Emits addressed to `room`
    pub fn to_room(&self, room: &Room) -> Vec<Emitted> {
        self.emitted
            .lock()
            .iter()
            .filter(|e| e.room.as_ref() == Some(room))
            .cloned()
            .collect()
    }

    pub fn dissolved(&self) -> Vec<Room> {
        self.dissolved.lock().clone()
    }

    pub fn clear(&self) {
        self.emitted.lock().clear();
    }

    fn reach(&self, room: &Room) -> usize {
        let bindings = self.bindings.lock();
        match room {
            Room::User(user_id) => bindings.get(user_id).copied().unwrap_or(0),
            other => self
                .rooms
                .lock()
                .get(other)
                .map(|users| users.iter().filter_map(|u| bindings.get(u)).sum())
                .unwrap_or(0),
        }
    }

    fn record(&self, room: Option<Room>, event: &str, payload: &Value, delivered: usize) {
        self.emitted.lock().push(Emitted {
            room,
            event: event.to_string(),
            payload: payload.clone(),
            delivered,
        });
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn emit(&self, room: &Room, event: &str, payload: &Value) -> usize {
        let delivered = self.reach(room);
        self.record(Some(room.clone()), event, payload, delivered);
        delivered
    }

    async fn emit_except(
        &self,
        room: &Room,
        _connection_id: &str,
        event: &str,
        payload: &Value,
    ) -> usize {
        let delivered = self.reach(room).saturating_sub(1);
        self.record(Some(room.clone()), event, payload, delivered);
        delivered
    }

    async fn push_to_user(&self, user_id: &UserId, event: &str, payload: &Value) -> UserPush {
        let room = Room::user(user_id);
        let reach = self.reach(&room);
        let missed = self
            .lagging
            .lock()
            .get(user_id)
            .copied()
            .unwrap_or(0)
            .min(reach);
        let delivered = reach - missed;
        self.record(Some(room), event, payload, delivered);
        UserPush { delivered, missed }
    }

    async fn broadcast(&self, event: &str, payload: &Value) -> usize {
        let delivered = self.bindings.lock().values().sum();
        self.record(None, event, payload, delivered);
        delivered
    }

    async fn join_user(&self, room: &Room, user_id: &UserId) -> usize {
        self.rooms
            .lock()
            .entry(room.clone())
            .or_default()
            .insert(user_id.clone());
        self.bindings.lock().get(user_id).copied().unwrap_or(0)
    }

    async fn dissolve(&self, room: &Room) {
        self.rooms.lock().remove(room);
        self.dissolved.lock().push(room.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_open_and_strict() {
        let open = InMemoryDirectory::new();
        assert_eq!(open.resolve("u1").await.unwrap(), Some(UserId::from("u1")));
        assert_eq!(open.resolve("  ").await.unwrap(), None);

        let strict = InMemoryDirectory::strict();
        strict.add_user("u1");
        assert!(strict.resolve("u1").await.unwrap().is_some());
        assert!(strict.resolve("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_groups_and_participants() {
        let dir = InMemoryDirectory::new();
        dir.add_chat("g1", ChatType::Group, ["a", "b", "a"]);
        dir.add_chat("d1", ChatType::Direct, ["a", "c"]);

        assert_eq!(dir.groups_for_user(&UserId::from("a")).await.unwrap(), vec!["g1"]);
        assert_eq!(
            dir.chat_participants("g1").await.unwrap(),
            vec![UserId::from("a"), UserId::from("b")]
        );
        assert!(dir.chat_participants("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reaction_toggle_cycle() {
        let dir = InMemoryDirectory::new();
        dir.add_message(
            "m1",
            MessageRoute::direct("c1".into(), UserId::from("a"), UserId::from("b")),
        );
        let mut reaction = Reaction {
            message_id: "m1".into(),
            user_id: "b".into(),
            reaction: "+1".into(),
            ..Reaction::default()
        };

        assert_eq!(dir.toggle_reaction(&reaction).await.unwrap(), ReactionChange::Added);
        reaction.reaction = "heart".into();
        assert_eq!(dir.toggle_reaction(&reaction).await.unwrap(), ReactionChange::Updated);
        assert_eq!(dir.toggle_reaction(&reaction).await.unwrap(), ReactionChange::Removed);
        assert_eq!(dir.reaction_of("m1", "b"), None);

        reaction.message_id = "nope".into();
        assert!(dir.toggle_reaction(&reaction).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_save_message_assigns_id() {
        let dir = InMemoryDirectory::new();
        let msg: ChatMessage = serde_json::from_value(json!({
            "chatType": "Group", "chatId": "g1", "sender": {"id": "a"}, "text": "yo"
        }))
        .unwrap();

        let stored = dir.save_message(&msg).await.unwrap();
        let id = stored["_id"].as_str().unwrap().to_string();
        assert_eq!(stored["text"], "yo");
        assert_eq!(
            dir.message_route(&id).await.unwrap(),
            Some(MessageRoute::group("g1".into(), UserId::from("a")))
        );
    }

    #[tokio::test]
    async fn test_recording_transport_counts_bindings() {
        let transport = RecordingTransport::new();
        let a = UserId::from("a");
        transport.connect(&a);
        transport.connect(&a);

        let room = Room::user(&a);
        assert_eq!(transport.emit(&room, "newMessage", &json!({})).await, 2);

        let call = Room::call("c1");
        assert_eq!(transport.join_user(&call, &a).await, 2);
        transport.disconnect(&a);
        assert_eq!(transport.emit(&call, "call:ended", &json!({})).await, 1);

        transport.dissolve(&call).await;
        assert_eq!(transport.emit(&call, "x", &json!({})).await, 0);
        assert_eq!(transport.named("newMessage").len(), 1);
        assert_eq!(transport.dissolved(), vec![call]);
    }

    #[tokio::test]
    async fn test_recording_transport_lagging_bindings() {
        let transport = RecordingTransport::new();
        let a = UserId::from("a");
        assert_eq!(transport.push_to_user(&a, "newMessage", &json!({})).await, UserPush::default());

        transport.connect(&a);
        transport.connect(&a);
        transport.lag(&a, 1);
        let push = transport.push_to_user(&a, "newMessage", &json!({})).await;
        assert_eq!(push, UserPush { delivered: 1, missed: 1 });
        assert!(!push.is_complete());

        transport.lag(&a, 0);
        assert!(transport.push_to_user(&a, "newMessage", &json!({})).await.is_complete());
    }
}
