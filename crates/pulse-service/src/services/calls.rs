//! Call session registry
//!
//! One state machine per call, held in process memory:
//!
//! ```text
//! ringing ──accept──▶ connected ──end──▶ ended
//!    │                    ▲ (group calls: late accepts)
//!    ├──decline──▶ declined
//!    └──end / timeout / superseded──▶ ended
//! ```
//!
//! Terminal sessions are removed from the map, so a lookup after a decline or
//! an end reports the call as unknown. Signaling payloads are relayed to the
//! call room without inspection.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pulse_core::{
    CallSession, CallStats, CallStatus, CallType, ChatType, EventKind, Room, Transport,
    TransportEvent, UserId,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::error::{CallError, ServiceResult};

/// Parameters of `call:invite`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub call_type: CallType,
    #[serde(default)]
    pub chat_type: ChatType,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
}

/// WebRTC signaling message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    pub fn event(self) -> EventKind {
        match self {
            Self::Offer => EventKind::WebrtcOffer,
            Self::Answer => EventKind::WebrtcAnswer,
            Self::Candidate => EventKind::WebrtcCandidate,
        }
    }

    /// Payload field carrying the opaque signaling body
    pub fn field(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedCall {
    session: CallSession,
    /// Where the invite rang: the target's user room or the group room
    invitee: Room,
}

impl TrackedCall {
    /// Direct calls ring one target; group calls ring the whole group
    fn invites(&self, user_id: &UserId) -> bool {
        match &self.invitee {
            Room::User(target) => target == user_id,
            _ => true,
        }
    }
}

pub struct CallSessionRegistry {
    sessions: Arc<DashMap<String, TrackedCall>>,
    transport: Arc<dyn Transport>,
    ring_timeout: Option<Duration>,
}

impl std::fmt::Debug for CallSessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("ring_timeout", &self.ring_timeout)
            .finish()
    }
}

impl CallSessionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            transport,
            ring_timeout: None,
        }
    }

    /// End calls that are still ringing after `timeout`
    #[must_use]
    pub fn with_ring_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Start a ringing call
    ///
    /// `origin` is the inviting connection; it is skipped when a group
    /// invite rings the group room.
    pub async fn invite(
        &self,
        caller_id: &UserId,
        request: InviteRequest,
        origin: Option<&str>,
    ) -> ServiceResult<CallSession> {
        if request.room_id.trim().is_empty() {
            return Err(CallError::MissingField("roomId").into());
        }

        let invitee = if request.chat_type.is_group() {
            Room::group(request.room_id.as_str())
        } else {
            let target = request
                .target_user_id
                .as_ref()
                .filter(|target| !target.as_str().trim().is_empty())
                .ok_or(CallError::MissingField("targetUserId"))?;
            Room::user(target)
        };

        self.supersede(caller_id, &request.room_id).await;

        let session = CallSession::ringing(
            caller_id.clone(),
            request.room_id,
            request.call_type,
            request.chat_type,
        );
        let call_id = session.call_id.clone();
        self.sessions.insert(
            call_id.clone(),
            TrackedCall {
                session: session.clone(),
                invitee: invitee.clone(),
            },
        );

        let invite = json!({
            "callId": call_id,
            "callerId": caller_id,
            "callType": session.call_type,
            "roomId": session.room_id,
            "chatType": session.chat_type,
        });
        let event = EventKind::CallInvite.as_str();
        let rung = match (origin, request.chat_type.is_group()) {
            (Some(connection_id), true) => {
                self.transport
                    .emit_except(&invitee, connection_id, event, &invite)
                    .await
            }
            _ => self.transport.emit(&invitee, event, &invite).await,
        };

        self.transport
            .join_user(&session.signaling_room(), caller_id)
            .await;
        self.transport
            .emit(
                &Room::user(caller_id),
                TransportEvent::CallInitiated.as_str(),
                &json!({ "callId": call_id, "roomId": session.room_id }),
            )
            .await;

        tracing::info!(
            call_id = %call_id,
            caller_id = %caller_id,
            room_id = %session.room_id,
            call_type = ?session.call_type,
            rung,
            "Call initiated"
        );

        if let Some(timeout) = self.ring_timeout {
            self.schedule_expiry(call_id, timeout);
        }

        Ok(session)
    }

    /// Accept or decline a call on behalf of `user_id`
    pub async fn answer(
        &self,
        call_id: &str,
        user_id: &UserId,
        accepted: bool,
    ) -> ServiceResult<CallSession> {
        if accepted {
            self.accept(call_id, user_id).await
        } else {
            self.decline(call_id, user_id).await
        }
    }

    async fn accept(&self, call_id: &str, user_id: &UserId) -> ServiceResult<CallSession> {
        let session = {
            let mut call = self
                .sessions
                .get_mut(call_id)
                .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;
            if !call.invites(user_id) {
                return Err(CallError::NotParticipant(call_id.to_string()).into());
            }
            let session = &mut call.session;
            if session.caller_id == *user_id || !session.accepts_answer_from(user_id) {
                return Err(CallError::InvalidTransition {
                    call_id: call_id.to_string(),
                    status: session.status,
                    action: "accept",
                }
                .into());
            }
            session.add_participant(user_id.clone());
            session.status = CallStatus::Connected;
            session.clone()
        };

        let call_room = session.signaling_room();
        let caller_room = Room::user(&session.caller_id);
        self.transport.join_user(&call_room, user_id).await;

        self.transport
            .emit(
                &caller_room,
                EventKind::CallAnswered.as_str(),
                &json!({ "callId": call_id, "userId": user_id }),
            )
            .await;

        let connected = json!({ "callId": call_id, "participants": session.participants });
        let event = EventKind::CallConnected.as_str();
        self.transport.emit(&call_room, event, &connected).await;
        // The caller may not have joined the call room yet
        self.transport.emit(&caller_room, event, &connected).await;

        tracing::info!(
            call_id = %call_id,
            user_id = %user_id,
            participants = session.participants.len(),
            "Call connected"
        );

        Ok(session)
    }

    async fn decline(&self, call_id: &str, user_id: &UserId) -> ServiceResult<CallSession> {
        let removed = self.sessions.remove_if(call_id, |_, call| {
            call.session.status == CallStatus::Ringing
                && call.session.caller_id != *user_id
                && call.invites(user_id)
        });

        let Some((_, call)) = removed else {
            let current = self
                .sessions
                .get(call_id)
                .map(|call| (call.session.status, call.invites(user_id)));
            return Err(match current {
                Some((_, false)) => CallError::NotParticipant(call_id.to_string()),
                Some((status, true)) => CallError::InvalidTransition {
                    call_id: call_id.to_string(),
                    status,
                    action: "decline",
                },
                None => CallError::NotFound(call_id.to_string()),
            }
            .into());
        };

        let mut session = call.session;
        session.finish(CallStatus::Declined);

        self.transport
            .emit(
                &Room::user(&session.caller_id),
                EventKind::CallDeclined.as_str(),
                &json!({ "callId": call_id, "userId": user_id }),
            )
            .await;
        self.transport.dissolve(&session.signaling_room()).await;

        tracing::info!(call_id = %call_id, user_id = %user_id, "Call declined");
        Ok(session)
    }

    /// Relay a signaling message from a participant to the whole call room
    ///
    /// The sender's own legs get the message too; clients tell their own
    /// signals apart. Returns the number of connections written.
    pub async fn signal(
        &self,
        call_id: &str,
        kind: SignalKind,
        body: Value,
        sender: &UserId,
    ) -> ServiceResult<usize> {
        let room = {
            let call = self
                .sessions
                .get(call_id)
                .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;
            if !call.session.has_participant(sender) {
                return Err(CallError::NotParticipant(call_id.to_string()).into());
            }
            call.session.signaling_room()
        };

        let mut payload = Map::new();
        payload.insert("callId".to_string(), Value::String(call_id.to_string()));
        payload.insert(kind.field().to_string(), body);
        let payload = Value::Object(payload);

        let event = kind.event().as_str();
        let written = self.transport.emit(&room, event, &payload).await;

        tracing::debug!(call_id = %call_id, event, written, "Relayed signaling message");
        Ok(written)
    }

    /// End a ringing or connected call
    pub async fn end(&self, call_id: &str, ended_by: &UserId) -> ServiceResult<CallSession> {
        let removed = self
            .sessions
            .remove_if(call_id, |_, call| call.session.has_participant(ended_by));

        let Some((_, call)) = removed else {
            return Err(if self.sessions.contains_key(call_id) {
                CallError::NotParticipant(call_id.to_string())
            } else {
                CallError::NotFound(call_id.to_string())
            }
            .into());
        };

        let payload = json!({ "callId": call_id, "endedBy": ended_by });
        let session = close(self.transport.as_ref(), call, &payload).await;

        tracing::info!(call_id = %call_id, ended_by = %ended_by, "Call ended");
        Ok(session)
    }

    /// End the call in `room_id` that `user_id` takes part in, if any
    pub async fn hangup_by_room(
        &self,
        room_id: &str,
        user_id: &UserId,
    ) -> ServiceResult<Option<CallSession>> {
        let call_id = self
            .sessions
            .iter()
            .find(|call| call.session.room_id == room_id && call.session.has_participant(user_id))
            .map(|call| call.key().clone());

        match call_id {
            Some(call_id) => Ok(Some(self.end(&call_id, user_id).await?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.get(call_id).map(|call| call.session.clone())
    }

    /// Live sessions `user_id` takes part in, oldest first
    pub fn active_for_user(&self, user_id: &UserId) -> Vec<CallSession> {
        self.snapshot(|session| session.has_participant(user_id))
    }

    /// Every live session, oldest first
    pub fn all_active(&self) -> Vec<CallSession> {
        self.snapshot(|_| true)
    }

    pub fn stats(&self) -> CallStats {
        let sessions = self.all_active();
        CallStats::from_sessions(&sessions)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn snapshot(&self, filter: impl Fn(&CallSession) -> bool) -> Vec<CallSession> {
        let mut sessions: Vec<CallSession> = self
            .sessions
            .iter()
            .map(|call| call.session.clone())
            .filter(|session| session.is_active() && filter(session))
            .collect();
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.call_id.cmp(&b.call_id))
        });
        sessions
    }

    /// Replace ringing calls from the same caller in the same room
    async fn supersede(&self, caller_id: &UserId, room_id: &str) {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|call| {
                call.session.status == CallStatus::Ringing
                    && call.session.caller_id == *caller_id
                    && call.session.room_id == room_id
            })
            .map(|call| call.key().clone())
            .collect();

        for call_id in stale {
            let removed = self
                .sessions
                .remove_if(&call_id, |_, call| call.session.status == CallStatus::Ringing);
            if let Some((_, call)) = removed {
                let payload = json!({ "callId": call_id, "reason": "superseded" });
                close(self.transport.as_ref(), call, &payload).await;
                tracing::debug!(call_id = %call_id, "Superseded ringing call");
            }
        }
    }

    fn schedule_expiry(&self, call_id: String, timeout: Duration) {
        let sessions = Arc::clone(&self.sessions);
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let removed =
                sessions.remove_if(&call_id, |_, call| call.session.status == CallStatus::Ringing);
            if let Some((_, call)) = removed {
                let payload = json!({ "callId": call_id, "reason": "timeout" });
                close(transport.as_ref(), call, &payload).await;
                tracing::info!(call_id = %call_id, "Unanswered call expired");
            }
        });
    }
}

/// Announce the end of a removed call and tear down its room
async fn close(transport: &dyn Transport, call: TrackedCall, payload: &Value) -> CallSession {
    let TrackedCall {
        mut session,
        invitee,
    } = call;
    let was_ringing = session.status == CallStatus::Ringing;
    session.finish(CallStatus::Ended);

    let room = session.signaling_room();
    let event = EventKind::CallEnded.as_str();
    transport.emit(&room, event, payload).await;
    if was_ringing {
        // Stop the ringing on the invited side
        transport.emit(&invitee, event, payload).await;
    }
    transport.dissolve(&room).await;

    session
}
