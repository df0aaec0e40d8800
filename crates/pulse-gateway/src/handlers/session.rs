//! Session handlers
//!
//! Room membership and presence queries for the connection's own user.

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::protocol::{ChatRef, CloseCode, Envelope, UserRef};
use crate::server::GatewayState;
use futures::future::join_all;
use pulse_core::{EventKind, OutboundEvent, Room, TransportEvent, UserId, UserStatus};
use serde_json::json;
use std::sync::Arc;

/// Handles `register`, `activity` and the room/presence queries
pub struct SessionHandler;

impl SessionHandler {
    /// Join the group rooms of every chat the user belongs to
    ///
    /// Returns the number of group rooms joined.
    pub async fn join_group_rooms(
        state: &GatewayState,
        connection: &Arc<Connection>,
    ) -> HandlerResult<usize> {
        let groups = state
            .service_context()
            .directory()
            .groups_for_user(connection.user_id())
            .await?;

        for chat_id in &groups {
            state
                .connection_manager()
                .join_room(connection.connection_id(), Room::group(chat_id.as_str()))
                .await;
        }

        tracing::debug!(
            connection_id = %connection.connection_id(),
            user_id = %connection.user_id(),
            groups = groups.len(),
            "Joined group rooms"
        );

        Ok(groups.len())
    }

    /// Idempotent re-registration
    ///
    /// Rejoins the per-user room and the current group rooms, then renews
    /// the heartbeat marker. Presence transitions are not re-announced.
    pub async fn register(
        state: &GatewayState,
        connection: &Arc<Connection>,
    ) -> HandlerResult<Option<CloseCode>> {
        let user_id = connection.user_id();
        state
            .connection_manager()
            .join_room(connection.connection_id(), Room::user(user_id))
            .await;
        Self::join_group_rooms(state, connection).await?;
        state.service_context().presence().heartbeat(user_id).await?;

        tracing::debug!(connection_id = %connection.connection_id(), user_id = %user_id, "Registered");
        Ok(None)
    }

    pub async fn activity(
        state: &GatewayState,
        connection: &Arc<Connection>,
    ) -> HandlerResult<Option<CloseCode>> {
        state
            .service_context()
            .presence()
            .touch(connection.user_id())
            .await?;
        Ok(None)
    }

    /// Reply with the target's current presence
    ///
    /// Only the requester receives the reply; it does not join the target's room.
    pub async fn subscribe_to_user(
        state: &GatewayState,
        connection: &Arc<Connection>,
        target: UserRef,
    ) -> HandlerResult<Option<CloseCode>> {
        let target = UserId::parse(target.user_id()).ok_or_else(HandlerError::missing_fields)?;
        let record = state.service_context().presence().record(&target).await?;

        let reply = Envelope::new(
            TransportEvent::UserStatus.as_str(),
            json!({
                "userId": record.user_id,
                "status": UserStatus::from_online(record.online),
                "lastActiveAt": record.last_active_at,
            }),
        );
        reply_to(connection, reply).await;
        Ok(None)
    }

    /// Reply with every participant of a chat and whether each is online
    pub async fn get_room_members(
        state: &GatewayState,
        connection: &Arc<Connection>,
        chat: ChatRef,
    ) -> HandlerResult<Option<CloseCode>> {
        let chat_id = chat.chat_id().ok_or_else(HandlerError::missing_fields)?;
        let context = state.service_context();
        let participants = context.directory().chat_participants(chat_id).await?;

        let members = join_all(participants.iter().map(|user_id| async move {
            let online = context
                .presence()
                .is_online(user_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(user_id = %user_id, error = %e, "Presence lookup failed");
                    false
                });
            json!({ "userId": user_id, "online": online })
        }))
        .await;

        let reply = Envelope::new(
            TransportEvent::RoomMembers.as_str(),
            json!({ "chatId": chat_id, "members": members }),
        );
        reply_to(connection, reply).await;
        Ok(None)
    }

    /// Join a chat's group room and tell the other participants
    pub async fn join_chat(
        state: &GatewayState,
        connection: &Arc<Connection>,
        chat: ChatRef,
    ) -> HandlerResult<Option<CloseCode>> {
        let chat_id = chat.chat_id().ok_or_else(HandlerError::missing_fields)?;
        let user_id = connection.user_id();

        state
            .connection_manager()
            .join_room(connection.connection_id(), Room::group(chat_id))
            .await;

        let event = OutboundEvent::new(
            EventKind::JoinChat,
            json!({ "chatId": chat_id, "userId": user_id }),
        );
        state
            .service_context()
            .router()
            .route_to_chat(&event, chat_id, Some(user_id))
            .await?;

        Ok(None)
    }

    pub async fn leave_chat(
        state: &GatewayState,
        connection: &Arc<Connection>,
        chat: ChatRef,
    ) -> HandlerResult<Option<CloseCode>> {
        let chat_id = chat.chat_id().ok_or_else(HandlerError::missing_fields)?;
        state
            .connection_manager()
            .leave_room(connection.connection_id(), &Room::group(chat_id))
            .await;
        Ok(None)
    }
}

/// Send a reply to the requesting connection only
pub(crate) async fn reply_to(connection: &Connection, envelope: Envelope) {
    if connection.send(envelope).await.is_err() {
        tracing::debug!(
            connection_id = %connection.connection_id(),
            "Connection closed before reply"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{connect, drain_events, Harness};
    use pulse_core::ChatType;

    #[tokio::test]
    async fn test_join_group_rooms_from_directory() {
        let h = Harness::new();
        h.directory.add_chat("g1", ChatType::Group, ["a", "b"]);
        h.directory.add_chat("g2", ChatType::Group, ["a"]);
        let (conn, _rx) = connect(&h, "c1", "a").await;

        assert_eq!(SessionHandler::join_group_rooms(&h.state, &conn).await.unwrap(), 2);
        assert!(conn.is_in(&Room::group("g1")).await);
        assert!(conn.is_in(&Room::group("g2")).await);
    }

    #[tokio::test]
    async fn test_register_is_silent() {
        let h = Harness::new();
        let (conn, mut rx) = connect(&h, "c1", "a").await;
        h.state
            .service_context()
            .presence()
            .set_online(&UserId::from("a"))
            .await
            .unwrap();
        drain_events(&mut rx);

        SessionHandler::register(&h.state, &conn).await.unwrap();
        SessionHandler::register(&h.state, &conn).await.unwrap();
        assert!(drain_events(&mut rx).is_empty());
        assert!(conn.is_in(&Room::user(&UserId::from("a"))).await);
    }

    #[tokio::test]
    async fn test_subscribe_to_user_replies_to_requester_only() {
        let h = Harness::new();
        let (conn, mut rx) = connect(&h, "c1", "a").await;
        let (_other, mut other_rx) = connect(&h, "c2", "c").await;

        SessionHandler::subscribe_to_user(&h.state, &conn, UserRef::Id("b".into()))
            .await
            .unwrap();

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "userStatus");
        assert_eq!(events[0].data["userId"], "b");
        assert_eq!(events[0].data["status"], "offline");
        assert!(drain_events(&mut other_rx).is_empty());
        assert!(!conn.is_in(&Room::user(&UserId::from("b"))).await);
    }

    #[tokio::test]
    async fn test_get_room_members_reports_online_flags() {
        let h = Harness::new();
        h.directory.add_chat("g1", ChatType::Group, ["a", "b"]);
        let (conn, mut rx) = connect(&h, "c1", "a").await;
        h.state
            .service_context()
            .presence()
            .set_online(&UserId::from("a"))
            .await
            .unwrap();
        drain_events(&mut rx);

        SessionHandler::get_room_members(&h.state, &conn, ChatRef::Id("g1".into()))
            .await
            .unwrap();

        let events = drain_events(&mut rx);
        assert_eq!(events[0].event, "roomMembers");
        assert_eq!(
            events[0].data,
            json!({
                "chatId": "g1",
                "members": [{"userId": "a", "online": true}, {"userId": "b", "online": false}]
            })
        );
    }

    #[tokio::test]
    async fn test_join_chat_notifies_other_participants() {
        let h = Harness::new();
        h.directory.add_chat("g1", ChatType::Group, ["a", "b"]);
        let (conn, mut rx) = connect(&h, "c1", "a").await;

        SessionHandler::join_chat(
            &h.state,
            &conn,
            ChatRef::Object {
                chat_id: "g1".into(),
            },
        )
        .await
        .unwrap();

        assert!(conn.is_in(&Room::group("g1")).await);
        assert!(drain_events(&mut rx).is_empty());
        // b is offline, so the announcement waits in the mailbox
        let queued = h
            .state
            .service_context()
            .mailbox()
            .drain(&UserId::from("b"))
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, EventKind::JoinChat);
        assert_eq!(queued[0].payload, json!({"chatId": "g1", "userId": "a"}));
    }

    #[tokio::test]
    async fn test_leave_chat_and_blank_ids() {
        let h = Harness::new();
        let (conn, _rx) = connect(&h, "c1", "a").await;
        h.state
            .connection_manager()
            .join_room("c1", Room::group("g1"))
            .await;

        SessionHandler::leave_chat(&h.state, &conn, ChatRef::Id("g1".into()))
            .await
            .unwrap();
        assert!(!conn.is_in(&Room::group("g1")).await);

        let err = SessionHandler::leave_chat(&h.state, &conn, ChatRef::Id("  ".into()))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
