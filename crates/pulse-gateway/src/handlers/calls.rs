//! Call handlers
//!
//! Thin adapters from client frames to `CallSessionRegistry`. Registry
//! errors come back to the originator as `chatError {error, callId}`.

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::protocol::{AnswerCallPayload, CallRef, CloseCode};
use crate::server::GatewayState;
use pulse_service::{InviteRequest, SignalKind};
use serde_json::Value;
use std::sync::Arc;

pub struct CallHandler;

impl CallHandler {
    pub async fn invite(
        state: &GatewayState,
        connection: &Arc<Connection>,
        request: InviteRequest,
    ) -> HandlerResult<Option<CloseCode>> {
        state
            .service_context()
            .calls()
            .invite(
                connection.user_id(),
                request,
                Some(connection.connection_id()),
            )
            .await?;
        Ok(None)
    }

    pub async fn answer(
        state: &GatewayState,
        connection: &Arc<Connection>,
        payload: AnswerCallPayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let call_id = required_call_id(&payload.call_id)?;
        state
            .service_context()
            .calls()
            .answer(call_id, connection.user_id(), payload.accepted)
            .await?;
        Ok(None)
    }

    pub async fn end(
        state: &GatewayState,
        connection: &Arc<Connection>,
        payload: CallRef,
    ) -> HandlerResult<Option<CloseCode>> {
        let call_id = required_call_id(&payload.call_id)?;
        state
            .service_context()
            .calls()
            .end(call_id, connection.user_id())
            .await?;
        Ok(None)
    }

    /// Relay an offer, answer or ICE candidate to every leg of the call
    pub async fn signal(
        state: &GatewayState,
        connection: &Arc<Connection>,
        kind: SignalKind,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let call: CallRef = serde_json::from_value(data.clone())
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;
        let call_id = required_call_id(&call.call_id)?;
        let body = data.get(kind.field()).cloned().unwrap_or(Value::Null);

        state
            .service_context()
            .calls()
            .signal(call_id, kind, body, connection.user_id())
            .await?;
        Ok(None)
    }
}

fn required_call_id(call_id: &str) -> HandlerResult<&str> {
    let call_id = call_id.trim();
    if call_id.is_empty() {
        Err(HandlerError::missing_fields())
    } else {
        Ok(call_id)
    }
}
