//! Key-value store seam
//!
//! Presence and mailbox state live behind `KvStore` so the same logic runs
//! against Redis in production and against `MemoryStore` in tests and the
//! standalone mode. Every method maps onto one atomic store operation.

mod memory;
mod redis_store;

pub use memory::MemoryStore;

use crate::pool::RedisResult;
use async_trait::async_trait;

/// Keys touched by one binding update
#[derive(Debug, Clone, Copy)]
pub struct BindingKeys<'a> {
    /// Per-member binding counter
    pub counter: &'a str,
    /// Expiring marker set while bindings remain
    pub marker: &'a str,
    /// Set the member belongs to while bindings remain
    pub set: &'a str,
}

/// Outcome of an atomic binding update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingChange {
    /// Bindings left after the update
    pub count: i64,
    /// Whether set membership changed
    pub changed: bool,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    // Sets
    /// Returns true when the member was not present before
    async fn sadd(&self, key: &str, member: &str) -> RedisResult<bool>;
    /// Returns true when the member was present
    async fn srem(&self, key: &str, member: &str) -> RedisResult<bool>;
    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool>;
    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>>;
    async fn scard(&self, key: &str) -> RedisResult<usize>;

    // Counters
    async fn incr(&self, key: &str) -> RedisResult<i64>;
    async fn decr(&self, key: &str) -> RedisResult<i64>;

    // Strings
    async fn set(&self, key: &str, value: &str) -> RedisResult<()>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()>;
    async fn get(&self, key: &str) -> RedisResult<Option<String>>;

    // Lists
    /// Push to the head, refresh the key TTL and keep the first `max_len`
    /// items, as one atomic step. Returns the list length afterwards.
    async fn push_bounded(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> RedisResult<usize>;
    /// Items in `[start, stop]`, negative indices counting from the tail
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>>;
    /// Remove each of `items` once, searching from the tail. Returns how
    /// many were found.
    async fn remove_items(&self, key: &str, items: &[String]) -> RedisResult<usize>;
    async fn llen(&self, key: &str) -> RedisResult<usize>;

    // Bindings
    /// Count one more binding, refresh the counter and marker TTLs and add
    /// `member` to the set, as one atomic step. A counter left below zero
    /// restarts at one.
    async fn acquire_binding(
        &self,
        keys: BindingKeys<'_>,
        member: &str,
        ttl_secs: u64,
    ) -> RedisResult<BindingChange>;
    /// Count one binding fewer. When none remain, delete the counter and
    /// marker and remove `member` from the set, as one atomic step.
    async fn release_binding(&self, keys: BindingKeys<'_>, member: &str)
        -> RedisResult<BindingChange>;

    // Keys
    async fn exists(&self, key: &str) -> RedisResult<bool>;
    async fn del(&self, key: &str) -> RedisResult<bool>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> RedisResult<bool>;

    async fn ping(&self) -> RedisResult<()>;
}
