//! Chat handlers
//!
//! Messages, new chats, reactions, conversation settings and typing relays.
//! Persistence goes through `ChatRepository`; delivery goes through the
//! router so offline recipients get mailbox entries.

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::protocol::{AddChatPayload, CloseCode, TypingPayload, UpdateConversationPayload};
use crate::server::GatewayState;
use pulse_core::{
    ChatMessage, EventKind, MessageRoute, OutboundEvent, Reaction, Room, Transport,
    TransportEvent, UserId,
};
use pulse_service::RouteReport;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

/// Handles chat events
pub struct ChatHandler;

impl ChatHandler {
    /// Persist a chat message and deliver `newMessage`
    ///
    /// Group messages go to every participant, direct messages to sender and
    /// receiver. The sender is not excluded so their other devices stay in sync.
    pub async fn message(
        state: &GatewayState,
        connection: &Arc<Connection>,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let message: ChatMessage =
            serde_json::from_value(data).map_err(|_| HandlerError::missing_fields())?;

        if let Err(e) = message.validate_addressing() {
            tracing::debug!(
                connection_id = %connection.connection_id(),
                error = %e,
                "chatMessage rejected"
            );
            return Err(HandlerError::missing_fields());
        }

        if &message.sender_id() != connection.user_id() {
            tracing::warn!(
                connection_id = %connection.connection_id(),
                user_id = %connection.user_id(),
                sender_id = %message.sender_id(),
                "chatMessage sender does not match connection"
            );
            return Err(HandlerError::rejected("Sender does not match connection"));
        }

        let context = state.service_context();
        let stored = context.chats().save_message(&message).await.map_err(|e| {
            tracing::error!(chat_id = %message.chat_id(), error = %e, "Failed to save message");
            HandlerError::rejected("Failed to save message")
        })?;

        let event = OutboundEvent::new(EventKind::NewMessage, stored);
        let report = route_by(state, &message.route(), &event).await?;

        tracing::debug!(
            chat_id = %message.chat_id(),
            live = report.live,
            queued = report.queued,
            "Chat message delivered"
        );
        Ok(None)
    }

    /// Announce a new chat to its participants, except the creator
    pub async fn add_chat(
        state: &GatewayState,
        connection: &Arc<Connection>,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let payload: AddChatPayload = serde_json::from_value(data.clone())
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;

        let participants: Vec<UserId> = payload
            .participant_ids()
            .into_iter()
            .filter_map(UserId::parse)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if participants.is_empty() {
            tracing::warn!(
                connection_id = %connection.connection_id(),
                "addChat without participants ignored"
            );
            return Ok(None);
        }

        let event = OutboundEvent::new(EventKind::NewChat, data);
        state
            .service_context()
            .router()
            .route(&event, Some(connection.user_id()), Some(&participants))
            .await?;
        Ok(None)
    }

    /// Toggle a reaction and tell everyone who can see the message
    pub async fn add_reaction(
        state: &GatewayState,
        connection: &Arc<Connection>,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let reaction: Reaction =
            serde_json::from_value(data.clone()).map_err(|_| HandlerError::missing_fields())?;
        if reaction.validate().is_err() {
            return Err(HandlerError::missing_fields());
        }

        let chats = state.service_context().chats();
        let route = match chats.message_route(&reaction.message_id).await {
            Ok(Some(route)) => route,
            Ok(None) => return Err(HandlerError::rejected("Message not found")),
            Err(e) => {
                tracing::error!(message_id = %reaction.message_id, error = %e, "Reaction lookup failed");
                return Err(HandlerError::rejected("Failed to process reaction"));
            }
        };

        let change = chats.toggle_reaction(&reaction).await.map_err(|e| {
            if e.is_not_found() {
                HandlerError::rejected("Message not found")
            } else {
                tracing::error!(message_id = %reaction.message_id, error = %e, "Reaction toggle failed");
                HandlerError::rejected("Failed to process reaction")
            }
        })?;

        let event = OutboundEvent::new(change.event_kind(), data);
        route_by(state, &route, &event).await?;

        tracing::debug!(
            connection_id = %connection.connection_id(),
            message_id = %reaction.message_id,
            event = %event.kind,
            "Reaction toggled"
        );
        Ok(None)
    }

    /// Apply conversation settings for one participant
    pub async fn update_conversation(
        state: &GatewayState,
        connection: &Arc<Connection>,
        payload: UpdateConversationPayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let owner = payload
            .owner()
            .and_then(UserId::parse)
            .ok_or_else(HandlerError::missing_fields)?;

        state
            .service_context()
            .chats()
            .update_conversation(&payload.id, &owner, &payload.updates)
            .await
            .map_err(|e| {
                tracing::error!(
                    connection_id = %connection.connection_id(),
                    chat_id = %payload.id,
                    error = %e,
                    "Failed to update conversation"
                );
                HandlerError::rejected("Failed to update conversation")
            })?;

        let event = OutboundEvent::new(
            EventKind::ConversationUpdated,
            json!({ "id": payload.id, "updates": payload.updates }),
        );
        state
            .service_context()
            .router()
            .route(&event, None, Some(&[owner]))
            .await?;
        Ok(None)
    }

    /// Relay a typing indicator to the `to` room; never queued
    pub async fn typing(
        state: &GatewayState,
        connection: &Arc<Connection>,
        event: TransportEvent,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let payload: TypingPayload = serde_json::from_value(data.clone())
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;
        if payload.to.trim().is_empty() {
            return Err(HandlerError::missing_fields());
        }

        let room = Room::parse(&payload.to);
        let written = state
            .connection_manager()
            .emit(&room, event.as_str(), &data)
            .await;

        tracing::trace!(
            connection_id = %connection.connection_id(),
            room = %room,
            event = %event,
            written,
            "Typing relayed"
        );
        Ok(None)
    }
}

/// Deliver to {sender, receiver} for direct chats, to the participants otherwise
async fn route_by(
    state: &GatewayState,
    route: &MessageRoute,
    event: &OutboundEvent,
) -> HandlerResult<RouteReport> {
    let router = state.service_context().router();
    let report = match route.direct_recipients() {
        Some(recipients) => router.route(event, None, Some(&recipients)).await?,
        None => router.route_to_chat(event, route.chat_id(), None).await?,
    };
    Ok(report)
}
