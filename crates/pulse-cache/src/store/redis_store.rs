//! `KvStore` over the Redis pool

use super::{BindingChange, BindingKeys, KvStore};
use crate::pool::{RedisPool, RedisPoolError, RedisResult};
use async_trait::async_trait;
use redis::AsyncCommands;

/// KEYS: counter, marker, set. ARGV: member, ttl
const ACQUIRE_BINDING: &str = r#"
    local n = redis.call("INCR", KEYS[1])
    if n < 1 then
      n = 1
      redis.call("SET", KEYS[1], n)
    end
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    redis.call("SET", KEYS[2], "1", "EX", ARGV[2])
    local added = redis.call("SADD", KEYS[3], ARGV[1])
    return {n, added}
"#;

/// KEYS: counter, marker, set. ARGV: member
const RELEASE_BINDING: &str = r#"
    local n = redis.call("DECR", KEYS[1])
    if n > 0 then
      return {n, 0}
    end
    redis.call("DEL", KEYS[1], KEYS[2])
    local removed = redis.call("SREM", KEYS[3], ARGV[1])
    return {0, removed}
"#;

fn ttl_arg(ttl_secs: u64) -> RedisResult<i64> {
    i64::try_from(ttl_secs)
        .map_err(|_| RedisPoolError::InvalidArgument(format!("TTL too large: {ttl_secs}")))
}

fn index_arg(n: usize) -> RedisResult<isize> {
    isize::try_from(n).map_err(|_| RedisPoolError::InvalidArgument(format!("index too large: {n}")))
}

#[async_trait]
impl KvStore for RedisPool {
    async fn sadd(&self, key: &str, member: &str) -> RedisResult<bool> {
        let mut conn = RedisPool::get(self).await?;
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> RedisResult<bool> {
        let mut conn = RedisPool::get(self).await?;
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.smembers(key).await?)
    }

    async fn scard(&self, key: &str) -> RedisResult<usize> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.scard(key).await?)
    }

    async fn incr(&self, key: &str) -> RedisResult<i64> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.incr(key, 1).await?)
    }

    async fn decr(&self, key: &str) -> RedisResult<i64> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.decr(key, 1).await?)
    }

    async fn set(&self, key: &str, value: &str) -> RedisResult<()> {
        let mut conn = RedisPool::get(self).await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()> {
        let mut conn = RedisPool::get(self).await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.get(key).await?)
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> RedisResult<usize> {
        let ttl = ttl_arg(ttl_secs)?;
        let stop = index_arg(max_len.max(1))? - 1;
        let mut conn = RedisPool::get(self).await?;

        let (len,): (usize,) = redis::pipe()
            .atomic()
            .lpush(key, value)
            .expire(key, ttl)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(len.min(max_len))
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn remove_items(&self, key: &str, items: &[String]) -> RedisResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for item in items {
            pipe.lrem(key, -1, item);
        }
        let mut conn = RedisPool::get(self).await?;
        let removed: Vec<usize> = pipe.query_async(&mut conn).await?;
        Ok(removed.into_iter().sum())
    }

    async fn llen(&self, key: &str) -> RedisResult<usize> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.llen(key).await?)
    }

    async fn acquire_binding(
        &self,
        keys: BindingKeys<'_>,
        member: &str,
        ttl_secs: u64,
    ) -> RedisResult<BindingChange> {
        let ttl = ttl_arg(ttl_secs)?;
        let mut conn = RedisPool::get(self).await?;
        let (count, added): (i64, i64) = redis::Script::new(ACQUIRE_BINDING)
            .key(keys.counter)
            .key(keys.marker)
            .key(keys.set)
            .arg(member)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;
        Ok(BindingChange {
            count,
            changed: added > 0,
        })
    }

    async fn release_binding(
        &self,
        keys: BindingKeys<'_>,
        member: &str,
    ) -> RedisResult<BindingChange> {
        let mut conn = RedisPool::get(self).await?;
        let (count, removed): (i64, i64) = redis::Script::new(RELEASE_BINDING)
            .key(keys.counter)
            .key(keys.marker)
            .key(keys.set)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(BindingChange {
            count,
            changed: removed > 0,
        })
    }

    async fn exists(&self, key: &str) -> RedisResult<bool> {
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.exists(key).await?)
    }

    async fn del(&self, key: &str) -> RedisResult<bool> {
        let mut conn = RedisPool::get(self).await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> RedisResult<bool> {
        let ttl = ttl_arg(ttl_secs)?;
        let mut conn = RedisPool::get(self).await?;
        Ok(conn.expire(key, ttl).await?)
    }

    async fn ping(&self) -> RedisResult<()> {
        self.health_check().await
    }
}
