//! Test fixtures and data generators
//!
//! Provides reusable frames for integration tests.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Unique identifier with a readable prefix
pub fn unique_id(prefix: &str) -> String {
    format!("{prefix}{}", unique_suffix())
}

/// `chatMessage` payload for a direct chat
pub fn direct_message(chat_id: &str, sender: &str, receiver: &str, content: &str) -> Value {
    json!({
        "chatType": "DM",
        "chatId": chat_id,
        "sender": {"id": sender},
        "receiverId": receiver,
        "content": content
    })
}

/// `chatMessage` payload for a group chat
pub fn group_message(chat_id: &str, sender: &str, content: &str) -> Value {
    json!({
        "chatType": "Group",
        "chatId": chat_id,
        "sender": {"id": sender},
        "content": content
    })
}

/// `call:invite` payload for a one-to-one call
pub fn direct_call(room_id: &str, target: &str) -> Value {
    json!({
        "roomId": room_id,
        "callType": "audio",
        "chatType": "DM",
        "targetUserId": target
    })
}
