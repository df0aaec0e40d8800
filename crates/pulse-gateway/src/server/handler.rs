//! WebSocket handler
//!
//! Authenticates the upgrade, replays the mailbox and runs the per-connection
//! read, write and heartbeat tasks.

use crate::connection::{generate_connection_id, Connection};
use crate::handlers::{HandlerError, HandlerResult, MessageDispatcher, SessionHandler};
use crate::protocol::{CloseCode, Envelope, Frame};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use pulse_api::ApiError;
use pulse_common::AppError;
use pulse_core::UserId;
use serde::Deserialize;
use std::any::Any;
use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Channel buffer size for outgoing frames
const MESSAGE_BUFFER_SIZE: usize = 256;

/// How long the writer gets to flush a close frame
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Query parameters of the upgrade request
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// WebSocket gateway handler
///
/// The upgrade is refused with 401 unless `userId` resolves to a known user.
pub async fn socket_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let raw = params.user_id.unwrap_or_default();
    let user_id = match state.service_context().identity().resolve(&raw).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            tracing::debug!(user_id = %raw, "Rejected unauthenticated upgrade");
            return unauthorized();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Identity lookup failed");
            return unauthorized();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, socket, user_id))
}

fn unauthorized() -> Response {
    ApiError::from(AppError::Unauthenticated).into_response()
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket, user_id: UserId) {
    let connection_id = generate_connection_id();
    let (tx, mut rx) = mpsc::channel::<Frame>(MESSAGE_BUFFER_SIZE);

    // Register before replay so live events queue behind the backlog
    let connection = state
        .connection_manager()
        .add_connection(connection_id.clone(), user_id.clone(), tx)
        .await;

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    if let Err(e) = SessionHandler::join_group_rooms(&state, &connection).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to join group rooms");
    }
    if let Err(e) = state.service_context().presence().set_online(&user_id).await {
        // Unlisted users only get mailbox entries, so the socket would stay silent
        tracing::warn!(user_id = %user_id, error = %e, "Failed to mark user online, closing");
        let mut socket = socket;
        let _ = socket.send(close_message(CloseCode::UnknownError)).await;
        state
            .connection_manager()
            .remove_connection(&connection_id)
            .await;
        return;
    }

    let (mut ws_sink, mut ws_stream) = socket.split();

    if !replay_mailbox(&state, &user_id, &mut ws_sink).await {
        cleanup_connection(&state, &connection).await;
        return;
    }

    // Spawn task to write queued frames to the socket
    let connection_id_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                Frame::Event(envelope) => match envelope.to_json() {
                    Ok(json) => Message::Text(json),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                },
                Frame::Ping => Message::Ping(Vec::new()),
                Frame::Close(code) => {
                    let _ = ws_sink.send(close_message(code)).await;
                    break;
                }
            };

            if ws_sink.send(message).await.is_err() {
                tracing::warn!(
                    connection_id = %connection_id_send,
                    "Failed to send message to WebSocket"
                );
                break;
            }
        }

        let _ = ws_sink.close().await;
    });

    // Spawn task to read client frames
    let state_recv = state.clone();
    let connection_recv = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    connection_recv.touch().await;
                    if let Some(close_code) =
                        handle_text_message(&state_recv, &connection_recv, &text).await
                    {
                        return Some(close_code);
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!(
                        connection_id = %connection_recv.connection_id(),
                        "Binary messages not supported"
                    );
                    return Some(CloseCode::DecodeError);
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Pong replies are handled by axum
                    connection_recv.touch().await;
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(
                        connection_id = %connection_recv.connection_id(),
                        "Client closed connection"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection_recv.connection_id(),
                        error = %e,
                        "WebSocket error"
                    );
                    return None;
                }
            }
        }
        None
    });

    // Spawn heartbeat task: refresh presence while the client stays active
    let state_hb = state.clone();
    let connection_hb = connection.clone();
    let mut heartbeat_task = tokio::spawn(async move {
        let presence_config = state_hb.service_context().presence_config();
        let timeout = Duration::from_secs(presence_config.user_timeout_secs);
        let mut ticker = interval(presence_config.heartbeat_interval());
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let idle = connection_hb.idle_for().await;
            if idle > timeout {
                tracing::warn!(
                    connection_id = %connection_hb.connection_id(),
                    idle_ms = idle.as_millis(),
                    "Connection timed out"
                );
                break;
            }

            if let Err(e) = state_hb
                .service_context()
                .presence()
                .heartbeat(connection_hb.user_id())
                .await
            {
                tracing::warn!(user_id = %connection_hb.user_id(), error = %e, "Heartbeat failed");
            }
            if !connection_hb.ping().await {
                break;
            }
        }
    });

    // Wait for any task to complete
    let close_code = tokio::select! {
        result = &mut recv_task => match result {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Read task failed");
                Some(CloseCode::UnknownError)
            }
        },
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task ended");
            None
        }
        _ = &mut heartbeat_task => Some(CloseCode::SessionTimeout),
        () = connection.lagged() => Some(CloseCode::SlowConsumer),
    };

    recv_task.abort();
    heartbeat_task.abort();

    if let Some(code) = close_code {
        tracing::debug!(connection_id = %connection_id, close_code = %code, "Closing connection");
        let _ = tokio::time::timeout(CLOSE_GRACE, async {
            connection.close(code).await;
            let _ = (&mut send_task).await;
        })
        .await;
    }
    send_task.abort();

    cleanup_connection(&state, &connection).await;
}

/// Write the user's backlog straight to the socket
///
/// The mailbox is only cleared when every entry was written; returns false
/// when the socket failed.
async fn replay_mailbox(
    state: &GatewayState,
    user_id: &UserId,
    ws_sink: &mut SplitSink<WebSocket, Message>,
) -> bool {
    let mailbox = state.service_context().mailbox();
    let batch = match mailbox.drain_batch(user_id).await {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to read mailbox");
            return true;
        }
    };
    if batch.is_empty() {
        return true;
    }

    let replayed = batch.entries.len();
    for entry in &batch.entries {
        let Ok(json) = Envelope::from(entry.clone()).to_json() else {
            continue;
        };
        if ws_sink.send(Message::Text(json)).await.is_err() {
            tracing::warn!(user_id = %user_id, "Socket closed during mailbox replay");
            return false;
        }
    }

    if let Err(e) = mailbox.acknowledge(user_id, &batch).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to clear mailbox");
    }
    tracing::debug!(user_id = %user_id, replayed, "Mailbox replayed");
    true
}

/// Handle a text frame; returns a close code when the socket must close
async fn handle_text_message(
    state: &GatewayState,
    connection: &Arc<Connection>,
    text: &str,
) -> Option<CloseCode> {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection.connection_id(),
                error = %e,
                "Failed to parse frame"
            );
            return Some(CloseCode::DecodeError);
        }
    };

    tracing::trace!(
        connection_id = %connection.connection_id(),
        event = %envelope.event,
        "Received frame"
    );

    let event = envelope.event.clone();
    match guard_panics(MessageDispatcher::dispatch(state, connection, envelope)).await {
        Ok(close_code) => close_code,
        Err(e) => {
            if e.is_client_error() {
                tracing::debug!(connection_id = %connection.connection_id(), event = %event, error = %e, "Rejected event");
            } else {
                tracing::warn!(connection_id = %connection.connection_id(), event = %event, error = %e, "Handler error");
            }
            if connection.try_send(e.to_envelope(&event)).is_err() {
                tracing::debug!(connection_id = %connection.connection_id(), "Dropped error reply");
            }
            e.to_close_code()
        }
    }
}

/// Turn a panic inside `handler` into an internal error
async fn guard_panics<F>(handler: F) -> HandlerResult<Option<CloseCode>>
where
    F: Future<Output = HandlerResult<Option<CloseCode>>>,
{
    AssertUnwindSafe(handler)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::Internal(panic_message(&*panic))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

fn close_message(code: CloseCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.as_u16(),
        reason: Cow::Borrowed(code.description()),
    }))
}

/// Clean up a connection on disconnect
async fn cleanup_connection(state: &GatewayState, connection: &Arc<Connection>) {
    tracing::info!(connection_id = %connection.connection_id(), "Cleaning up connection");

    state
        .connection_manager()
        .remove_connection(connection.connection_id())
        .await;

    // The tracker only goes offline once the user's last binding is gone
    if let Err(e) = state
        .service_context()
        .presence()
        .set_offline(connection.user_id())
        .await
    {
        tracing::warn!(user_id = %connection.user_id(), error = %e, "Failed to mark user offline");
    }
}
