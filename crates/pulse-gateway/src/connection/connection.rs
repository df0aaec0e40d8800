//! Individual WebSocket connection
//!
//! One binding between a physical connection and a logical user.

use crate::protocol::{CloseCode, Envelope, Frame};
use pulse_core::{Room, UserId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, RwLock};

/// Generate a fresh connection id
pub fn generate_connection_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub struct Connection {
    /// Unique connection ID
    connection_id: String,

    /// User resolved at upgrade time
    user_id: UserId,

    /// Channel to the writer task
    sender: mpsc::Sender<Frame>,

    /// Rooms this connection joined
    rooms: RwLock<HashSet<Room>>,

    /// Last frame received from the client
    last_seen: RwLock<Instant>,

    /// Set once a guaranteed push could not be queued in time
    lagging: AtomicBool,
    lag_signal: Notify,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    pub fn new(connection_id: String, user_id: UserId, sender: mpsc::Sender<Frame>) -> Arc<Self> {
        Arc::new(Self {
            connection_id,
            user_id,
            sender,
            rooms: RwLock::new(HashSet::new()),
            last_seen: RwLock::new(Instant::now()),
            lagging: AtomicBool::new(false),
            lag_signal: Notify::new(),
            created_at: Instant::now(),
        })
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Record that the client is still there
    pub async fn touch(&self) {
        *self.last_seen.write().await = Instant::now();
    }

    /// Time since the last frame from the client
    pub async fn idle_for(&self) -> Duration {
        self.last_seen.read().await.elapsed()
    }

    /// Record a room join; returns false if already joined
    pub async fn join(&self, room: Room) -> bool {
        self.rooms.write().await.insert(room)
    }

    /// Record a room leave; returns false if not joined
    pub async fn leave(&self, room: &Room) -> bool {
        self.rooms.write().await.remove(room)
    }

    pub async fn rooms(&self) -> Vec<Room> {
        self.rooms.read().await.iter().cloned().collect()
    }

    pub async fn is_in(&self, room: &Room) -> bool {
        self.rooms.read().await.contains(room)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queue an event, waiting for buffer space
    pub async fn send(&self, envelope: Envelope) -> Result<(), mpsc::error::SendError<Frame>> {
        self.sender.send(Frame::Event(envelope)).await
    }

    /// Queue an event, waiting at most `timeout` for buffer space
    pub async fn send_timeout(
        &self,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<(), mpsc::error::SendTimeoutError<Frame>> {
        self.sender
            .send_timeout(Frame::Event(envelope), timeout)
            .await
    }

    /// Flag the connection as unable to keep up; wakes `lagged`
    pub fn mark_lagging(&self) {
        if !self.lagging.swap(true, Ordering::SeqCst) {
            self.lag_signal.notify_one();
        }
    }

    pub fn is_lagging(&self) -> bool {
        self.lagging.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has been flagged as lagging
    pub async fn lagged(&self) {
        if self.is_lagging() {
            return;
        }
        self.lag_signal.notified().await;
    }

    /// Queue an event without waiting; fails when the buffer is full
    pub fn try_send(&self, envelope: Envelope) -> Result<(), mpsc::error::TrySendError<Frame>> {
        self.sender.try_send(Frame::Event(envelope))
    }

    pub async fn ping(&self) -> bool {
        self.sender.send(Frame::Ping).await.is_ok()
    }

    /// Ask the writer task to close the socket
    pub async fn close(&self, code: CloseCode) {
        let _ = self.sender.send(Frame::Close(code)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.connection_id)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_connection_creation() {
        let (tx, _rx) = mpsc::channel(10);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);

        assert_eq!(conn.connection_id(), "c1");
        assert_eq!(conn.user_id().as_str(), "a");
        assert!(conn.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_connection_rooms() {
        let (tx, _rx) = mpsc::channel(10);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);

        assert!(conn.join(Room::group("g1")).await);
        assert!(!conn.join(Room::group("g1")).await);
        assert!(conn.is_in(&Room::group("g1")).await);

        assert!(conn.leave(&Room::group("g1")).await);
        assert!(!conn.leave(&Room::group("g1")).await);
    }

    #[tokio::test]
    async fn test_try_send_reports_full_buffer() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);

        assert!(conn.try_send(Envelope::new("newMessage", json!(1))).is_ok());
        assert!(conn.try_send(Envelope::new("newMessage", json!(2))).is_err());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, Frame::Event(Envelope::new("newMessage", json!(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_on_full_buffer() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);
        let wait = Duration::from_millis(50);

        assert!(conn.send_timeout(Envelope::new("newMessage", json!(1)), wait).await.is_ok());
        assert!(conn.send_timeout(Envelope::new("newMessage", json!(2)), wait).await.is_err());

        // Room frees up once the writer drains
        rx.recv().await.unwrap();
        assert!(conn.send_timeout(Envelope::new("newMessage", json!(3)), wait).await.is_ok());
    }

    #[tokio::test]
    async fn test_lagging_wakes_waiter_once() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);
        assert!(!conn.is_lagging());

        let waiter = tokio::spawn({
            let conn = conn.clone();
            async move { conn.lagged().await }
        });
        conn.mark_lagging();
        conn.mark_lagging();
        waiter.await.unwrap();

        assert!(conn.is_lagging());
        // Already flagged, returns at once
        conn.lagged().await;
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (tx, rx) = mpsc::channel(1);
        let conn = Connection::new("c1".to_string(), UserId::from("a"), tx);
        drop(rx);
        assert!(conn.is_closed());
        assert!(!conn.ping().await);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(generate_connection_id(), generate_connection_id());
    }
}
