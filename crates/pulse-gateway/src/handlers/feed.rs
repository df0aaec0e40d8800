//! Feed handlers (posts, comments, follows)

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::protocol::{CloseCode, FollowPayload};
use crate::server::GatewayState;
use pulse_core::{EventKind, OutboundEvent, UserId};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct FeedHandler;

impl FeedHandler {
    /// Broadcast a post or comment event to every online user but the author
    pub async fn broadcast(
        state: &GatewayState,
        connection: &Arc<Connection>,
        kind: EventKind,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let event = OutboundEvent::new(kind, data);
        let report = state
            .service_context()
            .router()
            .route(&event, Some(connection.user_id()), None)
            .await?;

        tracing::debug!(
            user_id = %connection.user_id(),
            event = %kind,
            recipients = report.recipients(),
            "Feed event broadcast"
        );
        Ok(None)
    }

    /// Notify the followed user; used for both `follow` and `unfollow`
    pub async fn follow(
        state: &GatewayState,
        connection: &Arc<Connection>,
        data: Value,
    ) -> HandlerResult<Option<CloseCode>> {
        let payload: FollowPayload =
            serde_json::from_value(data.clone()).map_err(|_| HandlerError::missing_fields())?;
        let followed =
            UserId::parse(&payload.followed_details.id).ok_or_else(HandlerError::missing_fields)?;

        let event = OutboundEvent::new(
            EventKind::FollowNotification,
            json!({
                "followedDetails": data.get("followedDetails").cloned().unwrap_or(Value::Null),
                "followerDetails": payload.follower_details,
                "timestamp": payload.time,
            }),
        );
        state
            .service_context()
            .router()
            .route(&event, None, Some(&[followed]))
            .await?;

        tracing::debug!(user_id = %connection.user_id(), "Follow notification routed");
        Ok(None)
    }
}
