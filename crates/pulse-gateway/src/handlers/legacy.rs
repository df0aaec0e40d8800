//! Legacy signaling handlers
//!
//! Room-keyed relays kept for older clients: `offer`, `answer`, `candidate`,
//! `hangup` and `join-room`. Newer clients use the `call:*` and `webrtc:*`
//! events instead.

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::protocol::{CloseCode, LegacySignalPayload};
use crate::server::GatewayState;
use pulse_core::{Room, Transport, TransportEvent};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared set of users that joined a legacy room
const ROOM_MEMBERS_PREFIX: &str = "room:";

pub struct LegacyHandler;

impl LegacyHandler {
    /// Relay a signaling body to `group:{room}`, skipping the sender
    ///
    /// Offers carry their room; answers and candidates are relayed bare.
    pub async fn relay(
        state: &GatewayState,
        connection: &Arc<Connection>,
        event: TransportEvent,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let payload: LegacySignalPayload = serde_json::from_value(data.clone())
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;
        let field = event.as_str();
        let body = data.get(field).cloned().unwrap_or(Value::Null);

        let relayed = match event {
            TransportEvent::Offer => json!({ "offer": body, "room": payload.room }),
            _ => body,
        };

        let written = state
            .connection_manager()
            .emit_except(
                &Room::group(payload.room.as_str()),
                connection.connection_id(),
                field,
                &relayed,
            )
            .await;

        tracing::trace!(
            connection_id = %connection.connection_id(),
            room = %payload.room,
            event = field,
            written,
            "Legacy signal relayed"
        );
        Ok(None)
    }

    /// End the caller's session in `room` and tell the other side
    pub async fn hangup(
        state: &GatewayState,
        connection: &Arc<Connection>,
        room: String,
    ) -> HandlerResult<Option<CloseCode>> {
        if room.trim().is_empty() {
            return Err(HandlerError::missing_fields());
        }

        let ended = state
            .service_context()
            .calls()
            .hangup_by_room(&room, connection.user_id())
            .await?;
        if let Some(session) = ended {
            tracing::debug!(call_id = %session.call_id, room = %room, "Call ended by legacy hangup");
        }

        state
            .connection_manager()
            .emit_except(
                &Room::group(room.as_str()),
                connection.connection_id(),
                TransportEvent::RemoteHangup.as_str(),
                &json!(room),
            )
            .await;
        Ok(None)
    }

    /// Join a free-form room; the second member triggers `user-joined`
    pub async fn join_room(
        state: &GatewayState,
        connection: &Arc<Connection>,
        room_id: String,
    ) -> HandlerResult<Option<CloseCode>> {
        if room_id.trim().is_empty() {
            return Err(HandlerError::missing_fields());
        }

        let room = Room::named(room_id.as_str());
        state
            .connection_manager()
            .join_room(connection.connection_id(), room.clone())
            .await;

        let store = state.service_context().store();
        let key = format!("{ROOM_MEMBERS_PREFIX}{room_id}");
        store.sadd(&key, connection.user_id().as_str()).await?;
        let members = store.scard(&key).await?;

        if members == 2 {
            state
                .connection_manager()
                .emit_except(
                    &room,
                    connection.connection_id(),
                    TransportEvent::UserJoined.as_str(),
                    &json!(room_id),
                )
                .await;
        }

        tracing::debug!(
            connection_id = %connection.connection_id(),
            room = %room_id,
            members,
            "Joined legacy room"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{connect, drain_events, Harness};
    use crate::handlers::CallHandler;
    use pulse_core::{CallType, ChatType, UserId};
    use pulse_service::InviteRequest;

    #[tokio::test]
    async fn test_offer_relayed_to_group_room() {
        let h = Harness::new();
        let (a, mut a_rx) = connect(&h, "c1", "a").await;
        let (_b, mut b_rx) = connect(&h, "c2", "b").await;
        for id in ["c1", "c2"] {
            h.state.connection_manager().join_room(id, Room::group("r1")).await;
        }

        let data = json!({"room": "r1", "offer": {"sdp": "x"}});
        LegacyHandler::relay(&h.state, &a, TransportEvent::Offer, data)
            .await
            .unwrap();
        let events = drain_events(&mut b_rx);
        assert_eq!(events[0].event, "offer");
        assert_eq!(events[0].data, json!({"offer": {"sdp": "x"}, "room": "r1"}));
        assert!(drain_events(&mut a_rx).is_empty());

        let data = json!({"room": "r1", "candidate": {"candidate": "c"}});
        LegacyHandler::relay(&h.state, &a, TransportEvent::Candidate, data)
            .await
            .unwrap();
        assert_eq!(drain_events(&mut b_rx)[0].data, json!({"candidate": "c"}));
    }

    #[tokio::test]
    async fn test_join_room_announces_second_member() {
        let h = Harness::new();
        let (a, mut a_rx) = connect(&h, "c1", "a").await;
        let (b, _b_rx) = connect(&h, "c2", "b").await;

        LegacyHandler::join_room(&h.state, &a, "r1".into()).await.unwrap();
        assert!(drain_events(&mut a_rx).is_empty());

        LegacyHandler::join_room(&h.state, &b, "r1".into()).await.unwrap();
        let events = drain_events(&mut a_rx);
        assert_eq!(events[0].event, "user-joined");
        assert_eq!(events[0].data, json!("r1"));
    }

    #[tokio::test]
    async fn test_hangup_ends_call_in_room() {
        let h = Harness::new();
        let (a, _a_rx) = connect(&h, "c1", "a").await;
        let request = InviteRequest {
            room_id: "r1".into(),
            call_type: CallType::Video,
            chat_type: ChatType::Direct,
            target_user_id: Some(UserId::from("b")),
        };
        CallHandler::invite(&h.state, &a, request).await.unwrap();
        assert_eq!(h.state.service_context().calls().len(), 1);

        LegacyHandler::hangup(&h.state, &a, "r1".into()).await.unwrap();
        assert!(h.state.service_context().calls().is_empty());
    }
}
