//! Redis-backed `SharedKv`. The compare-and-delete primitive is a Lua
//! script, the same pattern `rivet`'s matchmaker worker uses for its
//! lobby-count scripts: load once, `EVALSHA` on every call.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{KvError, SharedKv};

/// Deletes KEYS[1] only if its value equals ARGV[1].
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisKv {
    conn: redis::aio::ConnectionManager,
    compare_and_delete: redis::Script,
}

impl RedisKv {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(RedisKv {
            conn,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE_SCRIPT),
        })
    }

    fn map_err(error: redis::RedisError) -> KvError {
        KvError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl SharedKv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(Self::map_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(Self::map_err)
    }

    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(Self::map_err)
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let options = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = conn
            .set_options(key, value, options)
            .await
            .map_err(Self::map_err)?;
        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(deleted > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await.map_err(Self::map_err)?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(key, member).await.map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(Self::map_err)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor = 0u64;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }
}
