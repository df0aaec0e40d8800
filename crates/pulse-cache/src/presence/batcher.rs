//! Status batcher
//!
//! Collapses bursts of presence transitions into one periodic
//! `batchUserStatus` event. The pending map is bounded: the latest status
//! per user wins, and users beyond capacity are dropped until the next flush.

use parking_lot::Mutex;
use pulse_core::{StatusChange, Transport, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default number of distinct users held between flushes
pub const DEFAULT_BATCH_CAPACITY: usize = 1024;
/// Default flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct StatusBatcher {
    capacity: usize,
    pending: Mutex<Vec<StatusChange>>,
}

impl Default for StatusBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}

impl StatusBatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Record a transition; returns false when it was dropped for capacity
    pub fn record(&self, change: StatusChange) -> bool {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.iter_mut().find(|c| c.user_id == change.user_id) {
            existing.status = change.status;
            return true;
        }
        if pending.len() >= self.capacity {
            tracing::warn!(
                user_id = %change.user_id,
                capacity = self.capacity,
                "Status batch full, dropping transition"
            );
            return false;
        }
        pending.push(change);
        true
    }

    /// Take everything recorded since the last call
    pub fn take(&self) -> Vec<StatusChange> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Broadcast the pending batch, if any; returns the number of changes sent
    pub async fn flush(&self, transport: &dyn Transport) -> usize {
        let batch = self.take();
        if batch.is_empty() {
            return 0;
        }
        let count = batch.len();
        match serde_json::to_value(&batch) {
            Ok(payload) => {
                let reached = transport
                    .broadcast(TransportEvent::BatchUserStatus.as_str(), &payload)
                    .await;
                tracing::debug!(changes = count, connections = reached, "Flushed status batch");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode status batch"),
        }
        count
    }

    /// Flush on a fixed interval until the task is aborted
    pub fn spawn_flush(
        self: Arc<Self>,
        transport: Arc<dyn Transport>,
        every: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.flush(transport.as_ref()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{RecordingTransport, UserId, UserStatus};

    fn change(user: &str, status: UserStatus) -> StatusChange {
        StatusChange::new(UserId::from(user), status)
    }

    #[test]
    fn test_last_write_wins_per_user() {
        let batcher = StatusBatcher::new(8);
        batcher.record(change("a", UserStatus::Online));
        batcher.record(change("a", UserStatus::Offline));
        batcher.record(change("b", UserStatus::Online));

        let batch = batcher.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], change("a", UserStatus::Offline));
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let batcher = StatusBatcher::new(2);
        assert!(batcher.record(change("a", UserStatus::Online)));
        assert!(batcher.record(change("b", UserStatus::Online)));
        assert!(!batcher.record(change("c", UserStatus::Online)));
        // Existing users still update when full
        assert!(batcher.record(change("a", UserStatus::Offline)));
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_broadcasts_once() {
        let transport = RecordingTransport::new();
        let batcher = StatusBatcher::default();
        assert_eq!(batcher.flush(&transport).await, 0);

        batcher.record(change("a", UserStatus::Online));
        assert_eq!(batcher.flush(&transport).await, 1);

        let sent = transport.named("batchUserStatus");
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].payload,
            serde_json::json!([{"userId": "a", "status": "online"}])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_flush_runs_on_interval() {
        let transport = Arc::new(RecordingTransport::new());
        let batcher = Arc::new(StatusBatcher::default());
        let handle = batcher
            .clone()
            .spawn_flush(transport.clone(), Duration::from_secs(5));

        batcher.record(change("a", UserStatus::Online));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.named("batchUserStatus").len(), 1);

        handle.abort();
    }
}
