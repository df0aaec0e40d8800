//! Offline mailbox
//!
//! One list per user under `offline_messages:{userId}`. New entries are
//! pushed at the head, so the tail holds the oldest entry. Every push
//! refreshes the list TTL and trims it to the configured length.

use crate::pool::RedisResult;
use crate::store::KvStore;
use pulse_core::{MailboxEntry, OutboundEvent, UserId};
use std::sync::Arc;

/// Key prefix for per-user mailboxes
const MAILBOX_PREFIX: &str = "offline_messages:";
/// Default bound on entries per mailbox
pub const MAX_MESSAGES_PER_USER: usize = 1000;
/// Default mailbox TTL (24 hours)
pub const MESSAGE_TTL: u64 = 86_400;

/// Result of reading a mailbox
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailboxBatch {
    /// Decodable entries, oldest first
    pub entries: Vec<MailboxEntry>,
    /// Stored items as read, including undecodable ones
    raw: Vec<String>,
}

impl MailboxBatch {
    /// Number of stored items read
    pub fn stored(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[derive(Clone)]
pub struct Mailbox {
    store: Arc<dyn KvStore>,
    max_messages: usize,
    ttl_secs: u64,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("max_messages", &self.max_messages)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Mailbox {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_limits(store, MAX_MESSAGES_PER_USER, MESSAGE_TTL)
    }

    pub fn with_limits(store: Arc<dyn KvStore>, max_messages: usize, ttl_secs: u64) -> Self {
        Self {
            store,
            max_messages: max_messages.max(1),
            ttl_secs,
        }
    }

    fn mailbox_key(user_id: &UserId) -> String {
        format!("{MAILBOX_PREFIX}{user_id}")
    }

    /// Queue an event for `user_id`
    pub async fn enqueue(&self, user_id: &UserId, event: &OutboundEvent) -> RedisResult<MailboxEntry> {
        let entry = MailboxEntry::new(user_id.clone(), event, self.ttl_secs);
        let encoded = serde_json::to_string(&entry)?;
        let len = self
            .store
            .push_bounded(
                &Self::mailbox_key(user_id),
                &encoded,
                self.max_messages,
                self.ttl_secs,
            )
            .await?;

        tracing::debug!(
            user_id = %user_id,
            event = %event.kind,
            entry_id = %entry.id,
            queued = len,
            "Queued offline event"
        );

        Ok(entry)
    }

    /// Read the whole mailbox, oldest first, without removing anything
    pub async fn drain_batch(&self, user_id: &UserId) -> RedisResult<MailboxBatch> {
        let raw = self
            .store
            .lrange(&Self::mailbox_key(user_id), 0, -1)
            .await?;

        let entries = raw
            .iter()
            .rev()
            .filter_map(|item| match serde_json::from_str::<MailboxEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Skipping undecodable mailbox entry");
                    None
                }
            })
            .collect();

        Ok(MailboxBatch { entries, raw })
    }

    /// Entries for `user_id`, oldest first
    pub async fn drain(&self, user_id: &UserId) -> RedisResult<Vec<MailboxEntry>> {
        Ok(self.drain_batch(user_id).await?.entries)
    }

    /// Remove the items read by `drain_batch`
    ///
    /// Items are matched by value, so entries queued after the read stay in
    /// place for the next drain even when the bound pushed read items out.
    pub async fn acknowledge(&self, user_id: &UserId, batch: &MailboxBatch) -> RedisResult<()> {
        let removed = self
            .store
            .remove_items(&Self::mailbox_key(user_id), &batch.raw)
            .await?;
        if removed < batch.stored() {
            tracing::debug!(
                user_id = %user_id,
                read = batch.stored(),
                removed,
                "Some replayed entries had already left the mailbox"
            );
        }
        Ok(())
    }

    /// Delete the mailbox; a missing mailbox is not an error
    pub async fn clear(&self, user_id: &UserId) -> RedisResult<()> {
        self.store.del(&Self::mailbox_key(user_id)).await?;
        Ok(())
    }

    pub async fn count(&self, user_id: &UserId) -> RedisResult<usize> {
        self.store.llen(&Self::mailbox_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pulse_core::EventKind;
    use serde_json::json;

    fn event(n: usize) -> OutboundEvent {
        OutboundEvent::new(EventKind::NewMessage, json!({ "n": n }))
    }

    fn mailbox(max: usize) -> (Arc<MemoryStore>, Mailbox) {
        let store = Arc::new(MemoryStore::new());
        let mailbox = Mailbox::with_limits(store.clone(), max, MESSAGE_TTL);
        (store, mailbox)
    }

    #[tokio::test]
    async fn test_drain_returns_oldest_first() {
        let (_, mailbox) = mailbox(10);
        let b = UserId::from("b");
        for n in 0..3 {
            mailbox.enqueue(&b, &event(n)).await.unwrap();
        }

        let entries = mailbox.drain(&b).await.unwrap();
        let order: Vec<_> = entries.iter().map(|e| e.payload["n"].clone()).collect();
        assert_eq!(order, vec![json!(0), json!(1), json!(2)]);
        assert!(entries.iter().all(|e| e.user_id == b && e.kind == EventKind::NewMessage));
    }

    #[tokio::test]
    async fn test_bound_drops_oldest() {
        let (_, mailbox) = mailbox(3);
        let b = UserId::from("b");
        for n in 0..4 {
            mailbox.enqueue(&b, &event(n)).await.unwrap();
        }

        assert_eq!(mailbox.count(&b).await.unwrap(), 3);
        let first = &mailbox.drain(&b).await.unwrap()[0];
        assert_eq!(first.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_drain_clear_drain_is_empty() {
        let (_, mailbox) = mailbox(10);
        let b = UserId::from("b");
        mailbox.enqueue(&b, &event(0)).await.unwrap();

        assert_eq!(mailbox.drain(&b).await.unwrap().len(), 1);
        mailbox.clear(&b).await.unwrap();
        assert!(mailbox.drain(&b).await.unwrap().is_empty());
        // Clearing twice is fine
        mailbox.clear(&b).await.unwrap();
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_late_entries() {
        let (_, mailbox) = mailbox(10);
        let b = UserId::from("b");
        mailbox.enqueue(&b, &event(0)).await.unwrap();
        mailbox.enqueue(&b, &event(1)).await.unwrap();

        let batch = mailbox.drain_batch(&b).await.unwrap();
        mailbox.enqueue(&b, &event(2)).await.unwrap();
        mailbox.acknowledge(&b, &batch).await.unwrap();

        let rest = mailbox.drain(&b).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload["n"], 2);
    }

    #[tokio::test]
    async fn test_acknowledge_full_mailbox_keeps_late_entry() {
        let (_, mailbox) = mailbox(3);
        let b = UserId::from("b");
        for n in 0..3 {
            mailbox.enqueue(&b, &event(n)).await.unwrap();
        }

        let batch = mailbox.drain_batch(&b).await.unwrap();
        assert_eq!(batch.stored(), 3);
        // The bound pushes entry 0 out while the batch is being delivered
        mailbox.enqueue(&b, &event(3)).await.unwrap();
        mailbox.acknowledge(&b, &batch).await.unwrap();

        let rest = mailbox.drain(&b).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload["n"], 3);
    }

    #[tokio::test]
    async fn test_acknowledge_after_clear_is_harmless() {
        let (_, mailbox) = mailbox(10);
        let b = UserId::from("b");
        mailbox.enqueue(&b, &event(0)).await.unwrap();

        let batch = mailbox.drain_batch(&b).await.unwrap();
        mailbox.clear(&b).await.unwrap();
        mailbox.enqueue(&b, &event(1)).await.unwrap();
        mailbox.acknowledge(&b, &batch).await.unwrap();

        assert_eq!(mailbox.count(&b).await.unwrap(), 1);
        assert!(mailbox.acknowledge(&b, &MailboxBatch::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_entries_are_skipped() {
        let (store, mailbox) = mailbox(10);
        let b = UserId::from("b");
        mailbox.enqueue(&b, &event(0)).await.unwrap();
        store
            .push_bounded("offline_messages:b", "{not json", 10, 60)
            .await
            .unwrap();

        let batch = mailbox.drain_batch(&b).await.unwrap();
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.stored(), 2);

        // Acknowledging removes the undecodable item too
        mailbox.acknowledge(&b, &batch).await.unwrap();
        assert_eq!(mailbox.count(&b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mailboxes_are_per_user() {
        let (_, mailbox) = mailbox(10);
        mailbox.enqueue(&UserId::from("a"), &event(0)).await.unwrap();
        assert_eq!(mailbox.count(&UserId::from("b")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let (store, mailbox) = mailbox(10);
        store.fail_key("offline_messages:b");
        assert!(mailbox.enqueue(&UserId::from("b"), &event(0)).await.is_err());
        assert!(mailbox.enqueue(&UserId::from("c"), &event(0)).await.is_ok());
    }
}
