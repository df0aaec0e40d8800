//! Fan-out router
//!
//! Delivers one logical event to a resolved set of users. Each recipient is
//! decided on its own: online users get a live push to their user room,
//! everyone else gets a mailbox entry. A failure for one recipient is logged
//! and counted without touching the others.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use pulse_cache::{Mailbox, PresenceTracker};
use pulse_core::{MembershipDirectory, OutboundEvent, Transport, UserId};

use super::error::ServiceResult;

/// How one recipient was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Live,
    Queued,
    Failed,
}

/// Outcome of one router invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub live: usize,
    pub queued: usize,
    pub failed: usize,
}

impl RouteReport {
    pub fn recipients(&self) -> usize {
        self.live + self.queued + self.failed
    }

    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Live => self.live += 1,
            Delivery::Queued => self.queued += 1,
            Delivery::Failed => self.failed += 1,
        }
    }
}

pub struct FanoutRouter {
    presence: Arc<PresenceTracker>,
    mailbox: Mailbox,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn MembershipDirectory>,
}

impl std::fmt::Debug for FanoutRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutRouter")
            .field("presence", &self.presence)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

impl FanoutRouter {
    pub fn new(
        presence: Arc<PresenceTracker>,
        mailbox: Mailbox,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Self {
        Self {
            presence,
            mailbox,
            transport,
            directory,
        }
    }

    /// Route `event` to `targets`, or to every online user when `targets` is `None`
    ///
    /// # Errors
    /// Fails only when the untargeted recipient set cannot be resolved.
    /// Per-recipient failures are reported in `RouteReport::failed`.
    pub async fn route(
        &self,
        event: &OutboundEvent,
        exclude: Option<&UserId>,
        targets: Option<&[UserId]>,
    ) -> ServiceResult<RouteReport> {
        let candidates = match targets {
            Some(targets) => targets.to_vec(),
            None => self.presence.online_users().await?,
        };

        let mut seen = HashSet::new();
        let recipients: Vec<UserId> = candidates
            .into_iter()
            .filter(|user| Some(user) != exclude)
            .filter(|user| seen.insert(user.clone()))
            .collect();

        let outcomes = join_all(recipients.iter().map(|user| self.deliver(user, event))).await;

        let report = outcomes
            .into_iter()
            .fold(RouteReport::default(), |mut report, delivery| {
                report.record(delivery);
                report
            });

        tracing::debug!(
            event = %event.kind,
            live = report.live,
            queued = report.queued,
            failed = report.failed,
            "Routed event"
        );

        Ok(report)
    }

    /// Route `event` to every participant of `chat_id`
    ///
    /// Recipients come from the membership directory, not from room
    /// membership, so offline participants still get a mailbox entry.
    pub async fn route_to_chat(
        &self,
        event: &OutboundEvent,
        chat_id: &str,
        exclude: Option<&UserId>,
    ) -> ServiceResult<RouteReport> {
        let participants = self.directory.chat_participants(chat_id).await?;
        if participants.is_empty() {
            tracing::debug!(chat_id = %chat_id, event = %event.kind, "Chat has no participants");
            return Ok(RouteReport::default());
        }
        self.route(event, exclude, Some(&participants)).await
    }

    /// Serve one recipient
    pub async fn deliver(&self, user_id: &UserId, event: &OutboundEvent) -> Delivery {
        let online = match self.presence.is_online(user_id).await {
            Ok(online) => online,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Presence lookup failed, queueing instead");
                false
            }
        };

        if online {
            let push = self
                .transport
                .push_to_user(user_id, event.name(), &event.payload)
                .await;
            if push.is_complete() {
                return Delivery::Live;
            }
            if push.missed > 0 {
                // The lagging binding is closed and replays this on reconnect
                tracing::warn!(
                    user_id = %user_id,
                    event = %event.kind,
                    delivered = push.delivered,
                    missed = push.missed,
                    "Binding fell behind, queueing"
                );
            } else {
                // Listed online but no binding here
                tracing::debug!(user_id = %user_id, event = %event.kind, "No live binding, queueing");
            }
        }

        match self.mailbox.enqueue(user_id, event).await {
            Ok(_) => Delivery::Queued,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    event = %event.kind,
                    error = %e,
                    "Dropping event, mailbox unavailable"
                );
                Delivery::Failed
            }
        }
    }
}
