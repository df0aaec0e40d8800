//! Connection manager
//!
//! Tracks every live binding and the rooms it joined, using DashMap for
//! thread-safe access. It is the gateway's implementation of `Transport`:
//! the router and the call registry reach sockets only through it.

use super::Connection;
use crate::protocol::{Envelope, Frame};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use pulse_core::{Room, Transport, UserId, UserPush};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a guaranteed push waits for buffer space
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ConnectionManager {
    /// Active connections by connection ID
    connections: DashMap<String, Arc<Connection>>,

    /// User ID to connection IDs mapping
    user_connections: DashMap<UserId, HashSet<String>>,

    /// Room to connection IDs mapping
    rooms: DashMap<Room, HashSet<String>>,

    push_timeout: Duration,
}

impl ConnectionManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_connections: DashMap::new(),
            rooms: DashMap::new(),
            push_timeout: PUSH_TIMEOUT,
        }
    }

    /// Override how long guaranteed pushes wait for buffer space
    #[must_use]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new binding and join its per-user room
    pub async fn add_connection(
        &self,
        connection_id: String,
        user_id: UserId,
        sender: mpsc::Sender<Frame>,
    ) -> Arc<Connection> {
        let connection = Connection::new(connection_id.clone(), user_id.clone(), sender);
        self.connections
            .insert(connection_id.clone(), connection.clone());
        self.user_connections
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id.clone());
        self.join_room(&connection_id, Room::user(&user_id)).await;

        tracing::debug!(connection_id = %connection_id, user_id = %user_id, "Connection added");

        connection
    }

    /// Remove a binding and leave every room it joined
    ///
    /// Uses `alter` for atomic modify-and-cleanup operations to avoid TOCTOU race conditions.
    pub async fn remove_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(connection_id)?;

        self.user_connections
            .alter(connection.user_id(), |_, mut ids| {
                ids.remove(connection_id);
                ids
            });
        self.user_connections.retain(|_, ids| !ids.is_empty());

        for room in connection.rooms().await {
            self.rooms.alter(&room, |_, mut ids| {
                ids.remove(connection_id);
                ids
            });
        }
        self.rooms.retain(|_, ids| !ids.is_empty());

        tracing::debug!(
            connection_id = %connection_id,
            user_id = %connection.user_id(),
            "Connection removed"
        );

        Some(connection)
    }

    pub fn get_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|r| r.clone())
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Add one connection to a room
    pub async fn join_room(&self, connection_id: &str, room: Room) -> bool {
        let Some(connection) = self.get_connection(connection_id) else {
            return false;
        };
        connection.join(room.clone()).await;
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id.to_string());

        tracing::trace!(connection_id = %connection_id, room = %room.name(), "Joined room");
        true
    }

    /// Remove one connection from a room
    pub async fn leave_room(&self, connection_id: &str, room: &Room) -> bool {
        let Some(connection) = self.get_connection(connection_id) else {
            return false;
        };
        connection.leave(room).await;

        self.rooms.alter(room, |_, mut ids| {
            ids.remove(connection_id);
            ids
        });
        self.rooms.retain(|_, ids| !ids.is_empty());

        tracing::trace!(connection_id = %connection_id, room = %room.name(), "Left room");
        true
    }

    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.user_connections
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn room_connections(&self, room: &Room) -> Vec<Arc<Connection>> {
        self.rooms
            .get(room)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct users with at least one connection in `room`
    pub fn room_members(&self, room: &Room) -> Vec<UserId> {
        self.room_connections(room)
            .iter()
            .map(|c| c.user_id().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of distinct users with a live binding
    pub fn user_count(&self) -> usize {
        self.user_connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Queue an envelope on every connection, skipping full buffers
    ///
    /// Used for ephemeral events; anything that must arrive goes through
    /// `push_to_user`.
    fn deliver<'a>(
        connections: impl IntoIterator<Item = &'a Arc<Connection>>,
        envelope: &Envelope,
    ) -> usize {
        let mut sent = 0;
        for conn in connections {
            match conn.try_send(envelope.clone()) {
                Ok(()) => sent += 1,
                Err(e) => tracing::debug!(
                    connection_id = %conn.connection_id(),
                    event = %envelope.event,
                    error = %e,
                    "Dropped frame for connection"
                ),
            }
        }
        sent
    }
}

#[async_trait]
impl Transport for ConnectionManager {
    async fn emit(&self, room: &Room, event: &str, payload: &Value) -> usize {
        let connections = self.room_connections(room);
        let sent = Self::deliver(&connections, &Envelope::new(event, payload.clone()));
        tracing::trace!(room = %room.name(), event, sent, "Emitted to room");
        sent
    }

    async fn emit_except(
        &self,
        room: &Room,
        connection_id: &str,
        event: &str,
        payload: &Value,
    ) -> usize {
        let connections = self.room_connections(room);
        let targets = connections
            .iter()
            .filter(|c| c.connection_id() != connection_id);
        Self::deliver(targets, &Envelope::new(event, payload.clone()))
    }

    async fn push_to_user(&self, user_id: &UserId, event: &str, payload: &Value) -> UserPush {
        let connections = self.user_connections(user_id);
        let envelope = Envelope::new(event, payload.clone());

        let accepted = join_all(connections.iter().map(|conn| {
            let envelope = envelope.clone();
            async move {
                match conn.send_timeout(envelope, self.push_timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %conn.connection_id(),
                            user_id = %user_id,
                            event,
                            error = %e,
                            "Connection cannot keep up, closing it"
                        );
                        conn.mark_lagging();
                        false
                    }
                }
            }
        }))
        .await;

        let delivered = accepted.iter().filter(|ok| **ok).count();
        UserPush {
            delivered,
            missed: accepted.len() - delivered,
        }
    }

    async fn broadcast(&self, event: &str, payload: &Value) -> usize {
        let connections: Vec<Arc<Connection>> =
            self.connections.iter().map(|r| r.value().clone()).collect();
        let sent = Self::deliver(&connections, &Envelope::new(event, payload.clone()));
        tracing::debug!(event, sent, "Broadcast to all connections");
        sent
    }

    async fn join_user(&self, room: &Room, user_id: &UserId) -> usize {
        let ids: Vec<String> = self
            .user_connections
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut joined = 0;
        for id in ids {
            if self.join_room(&id, room.clone()).await {
                joined += 1;
            }
        }
        joined
    }

    async fn dissolve(&self, room: &Room) {
        if let Some((_, ids)) = self.rooms.remove(room) {
            for id in ids {
                if let Some(connection) = self.get_connection(&id) {
                    connection.leave(room).await;
                }
            }
            tracing::debug!(room = %room.name(), "Room dissolved");
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .field("users", &self.user_connections.len())
            .field("rooms", &self.rooms.len())
            .field("push_timeout", &self.push_timeout)
            .finish()
    }
}
