//! In-process `KvStore`
//!
//! Used when no Redis URL is configured and by the test suites. Expiry is
//! evaluated lazily against `tokio::time::Instant`, so paused-clock tests can
//! advance past a TTL.

use super::{BindingChange, BindingKeys, KvStore};
use crate::pool::{RedisPoolError, RedisResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    unavailable: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
}

fn wrong_type(key: &str) -> RedisPoolError {
    RedisPoolError::InvalidArgument(format!("WRONGTYPE operation against key {key}"))
}

/// Resolve a Redis-style inclusive range against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail, as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make operations on one key fail
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.lock().insert(key.into());
    }

    fn check(&self, key: &str) -> RedisResult<()> {
        if self.unavailable.load(Ordering::SeqCst) || self.failing_keys.lock().contains(key) {
            return Err(RedisPoolError::ConnectionNotAvailable);
        }
        Ok(())
    }

    /// Run `f` on the live (non-expired) slot map
    fn with_slots<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Slot>) -> RedisResult<T>,
    ) -> RedisResult<T> {
        self.with_keys(&[key], f)
    }

    /// Run `f` under one lock after evicting any of `keys` that expired
    fn with_keys<T>(
        &self,
        keys: &[&str],
        f: impl FnOnce(&mut HashMap<String, Slot>) -> RedisResult<T>,
    ) -> RedisResult<T> {
        for key in keys {
            self.check(key)?;
        }
        let mut slots = self.slots.lock();
        let now = Instant::now();
        for key in keys {
            if slots.get(*key).is_some_and(|slot| slot.is_expired(now)) {
                slots.remove(*key);
            }
        }
        f(&mut slots)
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> RedisResult<i64> {
        self.with_slots(key, |slots| {
            let next = counter(slots, key)? + delta;
            store_counter(slots, key, next);
            Ok(next)
        })
    }
}

fn counter(slots: &HashMap<String, Slot>, key: &str) -> RedisResult<i64> {
    match slots.get(key).map(|s| &s.value) {
        None => Ok(0),
        Some(Value::Str(raw)) => raw
            .parse()
            .map_err(|_| RedisPoolError::InvalidArgument(format!("not an integer: {key}"))),
        Some(_) => Err(wrong_type(key)),
    }
}

/// Overwrite a counter, keeping its TTL the way INCR does
fn store_counter(slots: &mut HashMap<String, Slot>, key: &str, value: i64) {
    let expires_at = slots.get(key).and_then(|s| s.expires_at);
    slots.insert(
        key.to_string(),
        Slot {
            value: Value::Str(value.to_string()),
            expires_at,
        },
    );
}

fn ensure_set(slots: &HashMap<String, Slot>, key: &str) -> RedisResult<()> {
    match slots.get(key).map(|s| &s.value) {
        None | Some(Value::Set(_)) => Ok(()),
        Some(_) => Err(wrong_type(key)),
    }
}

fn insert_member(slots: &mut HashMap<String, Slot>, key: &str, member: &str) -> RedisResult<bool> {
    let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::new(Value::Set(HashSet::new())));
    match &mut slot.value {
        Value::Set(set) => Ok(set.insert(member.to_string())),
        _ => Err(wrong_type(key)),
    }
}

fn remove_member(slots: &mut HashMap<String, Slot>, key: &str, member: &str) -> RedisResult<bool> {
    let Some(slot) = slots.get_mut(key) else {
        return Ok(false);
    };
    let Value::Set(set) = &mut slot.value else {
        return Err(wrong_type(key));
    };
    let removed = set.remove(member);
    if set.is_empty() {
        slots.remove(key);
    }
    Ok(removed)
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn sadd(&self, key: &str, member: &str) -> RedisResult<bool> {
        self.with_slots(key, |slots| insert_member(slots, key, member))
    }

    async fn srem(&self, key: &str, member: &str) -> RedisResult<bool> {
        self.with_slots(key, |slots| remove_member(slots, key, member))
    }

    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(false),
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn scard(&self, key: &str) -> RedisResult<usize> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(0),
            Some(Value::Set(set)) => Ok(set.len()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn incr(&self, key: &str) -> RedisResult<i64> {
        self.add_to_counter(key, 1)
    }

    async fn decr(&self, key: &str) -> RedisResult<i64> {
        self.add_to_counter(key, -1)
    }

    async fn set(&self, key: &str, value: &str) -> RedisResult<()> {
        self.with_slots(key, |slots| {
            slots.insert(key.to_string(), Slot::new(Value::Str(value.to_string())));
            Ok(())
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()> {
        self.with_slots(key, |slots| {
            slots.insert(
                key.to_string(),
                Slot {
                    value: Value::Str(value.to_string()),
                    expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
                },
            );
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> RedisResult<usize> {
        self.with_slots(key, |slots| {
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(Value::List(VecDeque::new())));
            let Value::List(list) = &mut slot.value else {
                return Err(wrong_type(key));
            };
            list.push_front(value.to_string());
            list.truncate(max_len.max(1));
            let len = list.len();
            slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
            Ok(len)
        })
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(resolve_range(list.len(), start, stop)
                .map(|(from, to)| list.range(from..=to).cloned().collect())
                .unwrap_or_default()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn remove_items(&self, key: &str, items: &[String]) -> RedisResult<usize> {
        self.with_slots(key, |slots| {
            let Some(slot) = slots.get_mut(key) else {
                return Ok(0);
            };
            let Value::List(list) = &mut slot.value else {
                return Err(wrong_type(key));
            };
            let mut removed = 0;
            for item in items {
                if let Some(at) = list.iter().rposition(|held| held == item) {
                    list.remove(at);
                    removed += 1;
                }
            }
            if list.is_empty() {
                slots.remove(key);
            }
            Ok(removed)
        })
    }

    async fn llen(&self, key: &str) -> RedisResult<usize> {
        self.with_slots(key, |slots| match slots.get(key).map(|s| &s.value) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn acquire_binding(
        &self,
        keys: BindingKeys<'_>,
        member: &str,
        ttl_secs: u64,
    ) -> RedisResult<BindingChange> {
        self.with_keys(&[keys.counter, keys.marker, keys.set], |slots| {
            ensure_set(slots, keys.set)?;
            let count = (counter(slots, keys.counter)? + 1).max(1);
            let expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
            slots.insert(
                keys.counter.to_string(),
                Slot {
                    value: Value::Str(count.to_string()),
                    expires_at,
                },
            );
            slots.insert(
                keys.marker.to_string(),
                Slot {
                    value: Value::Str("1".to_string()),
                    expires_at,
                },
            );
            let changed = insert_member(slots, keys.set, member)?;
            Ok(BindingChange { count, changed })
        })
    }

    async fn release_binding(
        &self,
        keys: BindingKeys<'_>,
        member: &str,
    ) -> RedisResult<BindingChange> {
        self.with_keys(&[keys.counter, keys.marker, keys.set], |slots| {
            ensure_set(slots, keys.set)?;
            let count = counter(slots, keys.counter)? - 1;
            if count > 0 {
                store_counter(slots, keys.counter, count);
                return Ok(BindingChange {
                    count,
                    changed: false,
                });
            }
            slots.remove(keys.counter);
            slots.remove(keys.marker);
            let changed = remove_member(slots, keys.set, member)?;
            Ok(BindingChange { count: 0, changed })
        })
    }

    async fn exists(&self, key: &str) -> RedisResult<bool> {
        self.with_slots(key, |slots| Ok(slots.contains_key(key)))
    }

    async fn del(&self, key: &str) -> RedisResult<bool> {
        self.with_slots(key, |slots| Ok(slots.remove(key).is_some()))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> RedisResult<bool> {
        self.with_slots(key, |slots| match slots.get_mut(key) {
            None => Ok(false),
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                Ok(true)
            }
        })
    }

    async fn ping(&self) -> RedisResult<()> {
        self.check("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert!(store.sadd("s", "b").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 2);
        assert_eq!(store.smembers("s").await.unwrap(), vec!["a", "b"]);
        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.sismember("s", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.decr("c").await.unwrap(), 1);
        assert_eq!(store.decr("fresh").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_push_bounded_keeps_newest() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.push_bounded("l", &i.to_string(), 3, 60).await.unwrap();
        }
        assert_eq!(store.llen("l").await.unwrap(), 3);
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_remove_items_by_value() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.push_bounded("l", &i.to_string(), 10, 60).await.unwrap();
        }
        let items = vec!["0".to_string(), "2".to_string(), "9".to_string()];
        assert_eq!(store.remove_items("l", &items).await.unwrap(), 2);
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["3", "1"]);

        let rest = vec!["1".to_string(), "3".to_string()];
        assert_eq!(store.remove_items("l", &rest).await.unwrap(), 2);
        assert!(!store.exists("l").await.unwrap());
        assert_eq!(store.remove_items("l", &rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_items_takes_tail_copy_first() {
        let store = MemoryStore::new();
        for value in ["x", "y", "x"] {
            store.push_bounded("l", value, 10, 60).await.unwrap();
        }
        store.remove_items("l", &["x".to_string()]).await.unwrap();
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["x", "y"]);
    }

    const KEYS: BindingKeys<'static> = BindingKeys {
        counter: "b:count",
        marker: "b:marker",
        set: "members",
    };

    #[tokio::test]
    async fn test_binding_lifecycle() {
        let store = MemoryStore::new();
        let first = store.acquire_binding(KEYS, "a", 60).await.unwrap();
        assert_eq!(first, BindingChange { count: 1, changed: true });
        let second = store.acquire_binding(KEYS, "a", 60).await.unwrap();
        assert_eq!(second, BindingChange { count: 2, changed: false });
        assert!(store.exists("b:marker").await.unwrap());

        let released = store.release_binding(KEYS, "a").await.unwrap();
        assert_eq!(released, BindingChange { count: 1, changed: false });
        assert!(store.sismember("members", "a").await.unwrap());

        let last = store.release_binding(KEYS, "a").await.unwrap();
        assert_eq!(last, BindingChange { count: 0, changed: true });
        assert!(!store.sismember("members", "a").await.unwrap());
        assert!(!store.exists("b:count").await.unwrap());
        assert!(!store.exists("b:marker").await.unwrap());
    }

    #[tokio::test]
    async fn test_stray_release_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let released = store.release_binding(KEYS, "a").await.unwrap();
        assert_eq!(released, BindingChange { count: 0, changed: false });
        assert!(!store.exists("b:count").await.unwrap());

        // A counter pushed below zero restarts at one
        store.set("b:count", "-3").await.unwrap();
        let acquired = store.acquire_binding(KEYS, "a", 60).await.unwrap();
        assert_eq!(acquired, BindingChange { count: 1, changed: true });
    }

    #[tokio::test(start_paused = true)]
    async fn test_binding_keys_expire_together() {
        let store = MemoryStore::new();
        store.acquire_binding(KEYS, "a", 30).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!store.exists("b:count").await.unwrap());
        assert!(!store.exists("b:marker").await.unwrap());
        // Set membership has no TTL
        assert!(store.sismember("members", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_binding_update_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.set("members", "not a set").await.unwrap();
        assert!(store.acquire_binding(KEYS, "a", 60).await.is_err());
        assert!(!store.exists("b:count").await.unwrap());

        store.fail_key("b:marker");
        assert!(store.release_binding(KEYS, "a").await.is_err());
    }

    #[tokio::test]
    async fn test_lrange_bounds() {
        let store = MemoryStore::new();
        assert!(store.lrange("none", 0, -1).await.unwrap().is_empty());
        for i in 0..3 {
            store.push_bounded("l", &i.to_string(), 10, 60).await.unwrap();
        }
        assert_eq!(store.lrange("l", 1, 1).await.unwrap(), vec!["1"]);
        assert_eq!(store.lrange("l", -2, -1).await.unwrap(), vec!["1", "0"]);
        assert!(store.lrange("l", 5, 9).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_key("bad");
        assert!(store.set("bad", "x").await.is_err());
        assert!(store.set("good", "x").await.is_ok());

        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.get("good").await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.sadd("k", "m").await.is_err());
    }
}
