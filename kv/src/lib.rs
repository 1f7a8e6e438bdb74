//! The shared KV store (§4.B): the string/set primitives the party
//! coordinator and reservation service need from the store, independent of
//! whichever concrete broker backs it in production.

pub mod error;
pub mod local;
pub mod lock;
#[cfg(feature = "redis-backend")]
pub mod redis_kv;

use std::time::Duration;

use async_trait::async_trait;

pub use error::KvError;
pub use local::LocalKv;
pub use lock::{DistributedLock, LockGuard};
#[cfg(feature = "redis-backend")]
pub use redis_kv::RedisKv;

/// String/set primitives a coordinator needs from the shared store. All
/// operations must be safely callable from any worker thread; failures are
/// surfaced to the caller rather than retried silently (§7).
#[async_trait]
pub trait SharedKv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// `SET` with an expiry.
    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Returns `true` if the key existed and was removed.
    async fn del(&self, key: &str) -> Result<bool, KvError>;

    /// `SETNX` with a TTL in one atomic step, the primitive behind
    /// [`DistributedLock::acquire`].
    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Deletes `key` only if its current value equals `expected`, atomically
    /// (a Lua script on Redis). This is how a lock is released without
    /// risking deleting a lock some other holder has since re-acquired.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// Returns `true` if `member` was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, KvError>;

    /// Returns `true` if `member` was present and removed.
    async fn srem(&self, key: &str, member: &str) -> Result<bool, KvError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// Lists keys matching `prefix*`. Used by maintenance sweeps; not
    /// expected to be called on a hot path.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}
