//! Presence tracker
//!
//! The online set `online_users` is the source of truth for reachability.
//! Each user also has a binding counter so that one of several connections
//! closing does not take the user offline, an expiring online marker renewed
//! by heartbeats, and a last-active timestamp.

use crate::pool::RedisResult;
use crate::presence::StatusBatcher;
use crate::store::{BindingKeys, KvStore};
use pulse_core::{
    now_millis, PresenceRecord, StatusChange, Transport, TransportEvent, UserId, UserStatus,
};
use std::sync::Arc;

/// Set of online user ids
pub const ONLINE_USERS_KEY: &str = "online_users";
/// Key prefix for per-user presence keys
const USER_PREFIX: &str = "user:";
/// Default TTL of the online marker
pub const DEFAULT_USER_TIMEOUT_SECS: u64 = 60;

/// Result of a presence update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
    Unchanged,
}

impl Transition {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

pub struct PresenceTracker {
    store: Arc<dyn KvStore>,
    transport: Arc<dyn Transport>,
    batcher: Arc<StatusBatcher>,
    user_timeout_secs: u64,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("user_timeout_secs", &self.user_timeout_secs)
            .field("pending_batch", &self.batcher.len())
            .finish()
    }
}

impl PresenceTracker {
    pub fn new(
        store: Arc<dyn KvStore>,
        transport: Arc<dyn Transport>,
        batcher: Arc<StatusBatcher>,
    ) -> Self {
        Self {
            store,
            transport,
            batcher,
            user_timeout_secs: DEFAULT_USER_TIMEOUT_SECS,
        }
    }

    /// Override the online marker TTL
    #[must_use]
    pub fn with_user_timeout(mut self, secs: u64) -> Self {
        self.user_timeout_secs = secs;
        self
    }

    pub fn batcher(&self) -> &Arc<StatusBatcher> {
        &self.batcher
    }

    fn online_key(user_id: &UserId) -> String {
        format!("{USER_PREFIX}{user_id}:online")
    }

    fn last_active_key(user_id: &UserId) -> String {
        format!("{USER_PREFIX}{user_id}:last_active")
    }

    fn bindings_key(user_id: &UserId) -> String {
        format!("{USER_PREFIX}{user_id}:bindings")
    }

    fn binding_keys<'a>(bindings_key: &'a str, online_key: &'a str) -> BindingKeys<'a> {
        BindingKeys {
            counter: bindings_key,
            marker: online_key,
            set: ONLINE_USERS_KEY,
        }
    }

    /// Register one more binding for `user_id`
    ///
    /// Only the binding that adds the user to the online set announces the
    /// transition.
    pub async fn set_online(&self, user_id: &UserId) -> RedisResult<Transition> {
        let (bindings_key, online_key) = (Self::bindings_key(user_id), Self::online_key(user_id));
        let change = self
            .store
            .acquire_binding(
                Self::binding_keys(&bindings_key, &online_key),
                user_id.as_str(),
                self.user_timeout_secs,
            )
            .await?;
        self.touch(user_id).await?;
        tracing::debug!(user_id = %user_id, bindings = change.count, "Binding registered");

        if change.changed {
            self.announce(user_id, UserStatus::Online).await;
            Ok(Transition::WentOnline)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    /// Release one binding of `user_id`
    ///
    /// The user leaves the online set only when no binding remains. The
    /// count check and the removal are one store step, so a binding
    /// registered concurrently is never wiped out.
    pub async fn set_offline(&self, user_id: &UserId) -> RedisResult<Transition> {
        self.touch(user_id).await?;
        let (bindings_key, online_key) = (Self::bindings_key(user_id), Self::online_key(user_id));
        let change = self
            .store
            .release_binding(
                Self::binding_keys(&bindings_key, &online_key),
                user_id.as_str(),
            )
            .await?;

        if change.count > 0 {
            tracing::debug!(user_id = %user_id, remaining = change.count, "Binding released, user still online");
            return Ok(Transition::Unchanged);
        }

        if change.changed {
            self.announce(user_id, UserStatus::Offline).await;
            Ok(Transition::WentOffline)
        } else {
            Ok(Transition::Unchanged)
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> RedisResult<bool> {
        self.store.sismember(ONLINE_USERS_KEY, user_id.as_str()).await
    }

    /// Renew the online marker; never announces anything
    pub async fn heartbeat(&self, user_id: &UserId) -> RedisResult<()> {
        self.renew_marker(user_id).await?;
        self.store
            .expire(&Self::bindings_key(user_id), self.user_timeout_secs)
            .await?;
        Ok(())
    }

    /// Record activity without changing online state
    pub async fn touch(&self, user_id: &UserId) -> RedisResult<()> {
        self.store
            .set(&Self::last_active_key(user_id), &now_millis().to_string())
            .await
    }

    /// Current presence snapshot of one user
    pub async fn record(&self, user_id: &UserId) -> RedisResult<PresenceRecord> {
        let online = self.is_online(user_id).await?;
        let last_active_at = self
            .store
            .get(&Self::last_active_key(user_id))
            .await?
            .and_then(|raw| raw.parse().ok());
        Ok(PresenceRecord {
            user_id: user_id.clone(),
            online,
            last_active_at,
        })
    }

    /// Every user currently in the online set
    pub async fn online_users(&self) -> RedisResult<Vec<UserId>> {
        Ok(self
            .store
            .smembers(ONLINE_USERS_KEY)
            .await?
            .into_iter()
            .filter_map(UserId::parse)
            .collect())
    }

    pub async fn online_count(&self) -> RedisResult<usize> {
        self.store.scard(ONLINE_USERS_KEY).await
    }

    async fn renew_marker(&self, user_id: &UserId) -> RedisResult<()> {
        self.store
            .set_ex(&Self::online_key(user_id), "1", self.user_timeout_secs)
            .await
    }

    async fn announce(&self, user_id: &UserId, status: UserStatus) {
        let change = StatusChange::new(user_id.clone(), status);
        match serde_json::to_value(&change) {
            Ok(payload) => {
                let reached = self
                    .transport
                    .broadcast(TransportEvent::UserStatus.as_str(), &payload)
                    .await;
                tracing::info!(user_id = %user_id, status = %status, connections = reached, "Presence changed");
            }
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to encode status"),
        }
        self.batcher.record(change);
    }
}
