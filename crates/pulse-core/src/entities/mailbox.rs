//! Mailbox entry entity

use crate::events::{EventKind, OutboundEvent};
use crate::value_objects::{generate_entry_id, now_millis, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event held for a user who had no live connection at delivery time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: UserId,
    pub payload: Value,
    /// Epoch milliseconds
    pub enqueued_at: i64,
    /// Seconds
    pub ttl: u64,
}

impl MailboxEntry {
    /// Create an entry for `user_id` from an outbound event
    #[must_use]
    pub fn new(user_id: UserId, event: &OutboundEvent, ttl: u64) -> Self {
        Self {
            id: generate_entry_id(),
            kind: event.kind,
            user_id,
            payload: event.payload.clone(),
            enqueued_at: now_millis(),
            ttl,
        }
    }

    /// Turn the entry back into the event it was created from
    #[must_use]
    pub fn into_event(self) -> OutboundEvent {
        OutboundEvent::new(self.kind, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_shape() {
        let event = OutboundEvent::new(EventKind::NewMessage, json!({"content": "hi"}));
        let entry = MailboxEntry::new(UserId::from("b"), &event, 86_400);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "newMessage");
        assert_eq!(value["userId"], "b");
        assert_eq!(value["payload"]["content"], "hi");
        assert_eq!(value["ttl"], 86_400);
        assert!(value["enqueuedAt"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_into_event_restores_original() {
        let event = OutboundEvent::new(EventKind::ReactionAdded, json!({"reaction": "+1"}));
        let entry = MailboxEntry::new(UserId::from("b"), &event, 60);
        assert_eq!(entry.into_event(), event);
    }
}
