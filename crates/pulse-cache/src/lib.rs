//! # pulse-cache
//!
//! Shared-state layer of the delivery core.
//!
//! ## Features
//!
//! - **Connection Pool**: managed Redis connection pool with deadpool
//! - **Store seam**: `KvStore` over Redis or process memory
//! - **Presence**: online set, binding counters, heartbeat markers and batched status
//! - **Mailbox**: bounded, expiring per-user queue of undelivered events
//!
//! ## Example
//!
//! ```ignore
//! use pulse_cache::{Mailbox, PresenceTracker, RedisPool, RedisPoolConfig, StatusBatcher};
//!
//! let pool = Arc::new(RedisPool::new(RedisPoolConfig::default())?);
//! let mailbox = Mailbox::new(pool.clone());
//! let presence = PresenceTracker::new(pool, transport, Arc::new(StatusBatcher::default()));
//!
//! presence.set_online(&user_id).await?;
//! mailbox.enqueue(&other_user, &event).await?;
//! ```

pub mod mailbox;
pub mod pool;
pub mod presence;
pub mod store;

// Re-export pool types
pub use pool::{
    create_shared_pool, RedisPool, RedisPoolConfig, RedisPoolError, RedisResult, SharedRedisPool,
};

// Re-export store types
pub use store::{BindingChange, BindingKeys, KvStore, MemoryStore};

// Re-export presence types
pub use presence::{
    PresenceTracker, StatusBatcher, Transition, DEFAULT_BATCH_CAPACITY, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_USER_TIMEOUT_SECS, ONLINE_USERS_KEY,
};

// Re-export mailbox types
pub use mailbox::{Mailbox, MailboxBatch, MAX_MESSAGES_PER_USER, MESSAGE_TTL};
