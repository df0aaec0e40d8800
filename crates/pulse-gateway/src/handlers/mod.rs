//! Event handlers
//!
//! Handles incoming frames based on their event name.

mod calls;
mod chat;
mod error;
mod feed;
mod legacy;
mod session;

pub use calls::CallHandler;
pub use chat::ChatHandler;
pub use error::{HandlerError, HandlerResult};
pub use feed::FeedHandler;
pub use legacy::LegacyHandler;
pub use session::SessionHandler;

use crate::connection::Connection;
use crate::protocol::{CloseCode, Envelope, InboundEvent};
use crate::server::GatewayState;
use pulse_core::{EventKind, TransportEvent};
use pulse_service::SignalKind;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Dispatch incoming client frames to the appropriate handler
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle an incoming client frame
    pub async fn dispatch(
        state: &GatewayState,
        connection: &Arc<Connection>,
        envelope: Envelope,
    ) -> HandlerResult<Option<CloseCode>> {
        let Some(event) = InboundEvent::from_name(&envelope.event) else {
            tracing::debug!(
                connection_id = %connection.connection_id(),
                event = %envelope.event,
                "Unknown event"
            );
            return Err(HandlerError::UnknownEvent(envelope.event));
        };

        if event.is_legacy() {
            tracing::trace!(connection_id = %connection.connection_id(), event = %event, "Legacy event");
        }

        match event {
            // Session
            InboundEvent::Register => SessionHandler::register(state, connection).await,
            InboundEvent::Activity => SessionHandler::activity(state, connection).await,
            InboundEvent::SubscribeToUser => {
                SessionHandler::subscribe_to_user(state, connection, payload(&envelope)?).await
            }
            InboundEvent::GetRoomMembers => {
                SessionHandler::get_room_members(state, connection, payload(&envelope)?).await
            }
            InboundEvent::JoinChat => {
                SessionHandler::join_chat(state, connection, payload(&envelope)?).await
            }
            InboundEvent::LeaveChat => {
                SessionHandler::leave_chat(state, connection, payload(&envelope)?).await
            }

            // Chat
            InboundEvent::ChatMessage => ChatHandler::message(state, connection, envelope.data).await,
            InboundEvent::AddChat => ChatHandler::add_chat(state, connection, envelope.data).await,
            InboundEvent::AddReaction => {
                ChatHandler::add_reaction(state, connection, envelope.data).await
            }
            InboundEvent::UpdateConversation => {
                ChatHandler::update_conversation(state, connection, payload(&envelope)?).await
            }
            InboundEvent::Typing => {
                ChatHandler::typing(state, connection, TransportEvent::UserTyping, envelope.data)
                    .await
            }
            InboundEvent::StopTyping => {
                ChatHandler::typing(state, connection, TransportEvent::UserStopTyping, envelope.data)
                    .await
            }

            // Feed
            InboundEvent::NewPost => {
                FeedHandler::broadcast(state, connection, EventKind::NewPost, envelope.data).await
            }
            InboundEvent::UpdatePost => {
                FeedHandler::broadcast(state, connection, EventKind::UpdatePost, envelope.data).await
            }
            InboundEvent::DeletePost => {
                FeedHandler::broadcast(state, connection, EventKind::DeletePost, envelope.data).await
            }
            InboundEvent::NewComment => {
                FeedHandler::broadcast(state, connection, EventKind::NewComment, envelope.data).await
            }
            InboundEvent::Follow | InboundEvent::Unfollow => {
                FeedHandler::follow(state, connection, envelope.data).await
            }

            // Calls
            InboundEvent::CallInvite => {
                CallHandler::invite(state, connection, payload(&envelope)?).await
            }
            InboundEvent::CallAnswer => {
                CallHandler::answer(state, connection, payload(&envelope)?).await
            }
            InboundEvent::CallEnd => CallHandler::end(state, connection, payload(&envelope)?).await,
            InboundEvent::WebrtcOffer => {
                CallHandler::signal(state, connection, SignalKind::Offer, envelope.data).await
            }
            InboundEvent::WebrtcAnswer => {
                CallHandler::signal(state, connection, SignalKind::Answer, envelope.data).await
            }
            InboundEvent::WebrtcCandidate => {
                CallHandler::signal(state, connection, SignalKind::Candidate, envelope.data).await
            }

            // Legacy signaling
            InboundEvent::Offer => {
                LegacyHandler::relay(state, connection, TransportEvent::Offer, envelope.data).await
            }
            InboundEvent::Answer => {
                LegacyHandler::relay(state, connection, TransportEvent::Answer, envelope.data).await
            }
            InboundEvent::Candidate => {
                LegacyHandler::relay(state, connection, TransportEvent::Candidate, envelope.data)
                    .await
            }
            InboundEvent::Hangup => {
                LegacyHandler::hangup(state, connection, payload(&envelope)?).await
            }
            InboundEvent::JoinRoom => {
                LegacyHandler::join_room(state, connection, payload(&envelope)?).await
            }
        }
    }
}

/// Decode the frame's data into the event's payload type
fn payload<T: DeserializeOwned>(envelope: &Envelope) -> HandlerResult<T> {
    envelope
        .data_as()
        .map_err(|e| HandlerError::InvalidPayload(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::test_support::{connect, drain_events, Harness};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_event_is_an_error_not_a_close() {
        let h = Harness::new();
        let (conn, _rx) = connect(&h, "c1", "a").await;

        let err = MessageDispatcher::dispatch(&h.state, &conn, Envelope::new("IDENTIFY", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnknownEvent(ref name) if name == "IDENTIFY"));
        assert!(err.to_close_code().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let h = Harness::new();
        let (conn, _rx) = connect(&h, "c1", "a").await;

        let err = MessageDispatcher::dispatch(&h.state, &conn, Envelope::new("call:answer", json!(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload(_)));
        assert_eq!(err.to_envelope("call:answer").data["event"], "call:answer");
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_name() {
        let h = Harness::new();
        let (conn, mut rx) = connect(&h, "c1", "a").await;

        let result = MessageDispatcher::dispatch(
            &h.state,
            &conn,
            Envelope::new("subscribeToUser", json!("b")),
        )
        .await
        .unwrap();
        assert!(result.is_none());
        assert_eq!(drain_events(&mut rx)[0].event, "userStatus");

        MessageDispatcher::dispatch(&h.state, &conn, Envelope::new("activity", json!(null)))
            .await
            .unwrap();
        let record = h
            .state
            .service_context()
            .presence()
            .record(conn.user_id())
            .await
            .unwrap();
        assert!(record.last_active_at.is_some());
    }
}
