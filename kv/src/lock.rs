//! Per-resource distributed lock built on [`SharedKv::setnx`] +
//! [`SharedKv::compare_and_delete`] (§4.E, §5). The party coordinator takes
//! one of these per party id before any mutation.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::{KvError, SharedKv};

/// A held lock. Dropping it does *not* release the lock — Rust has no
/// async `Drop`, so callers must explicitly `release()`. If the holder
/// crashes before releasing, the TTL expires the lock on its own (§5).
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Acquires and releases [`LockGuard`]s against a [`SharedKv`] backend.
pub struct DistributedLock {
    kv: Arc<dyn SharedKv>,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(kv: Arc<dyn SharedKv>, ttl: Duration) -> Self {
        DistributedLock { kv, ttl }
    }

    /// `SETNX fulcrum:party:lock:<resource> <token> EX <ttl>`. Returns
    /// `None` if someone else already holds the lock.
    pub async fn acquire(&self, key: &str) -> Result<Option<LockGuard>, KvError> {
        let token = Uuid::new_v4().to_string();
        let acquired = self.kv.setnx(key, &token, self.ttl).await?;
        if acquired {
            Ok(Some(LockGuard {
                key: key.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Releases `guard` via compare-and-delete: only removes the key if its
    /// value still matches the token we stored, so a lock that already
    /// expired and was re-acquired by someone else is left untouched.
    pub async fn release(&self, guard: LockGuard) -> Result<bool, KvError> {
        self.kv.compare_and_delete(&guard.key, &guard.token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalKv;

    #[tokio::test]
    async fn acquire_release_then_acquire_again_succeeds() {
        let lock = DistributedLock::new(Arc::new(LocalKv::new()), Duration::from_secs(5));
        let guard = lock.acquire("fulcrum:party:lock:p1").await.unwrap().unwrap();
        assert!(lock.acquire("fulcrum:party:lock:p1").await.unwrap().is_none());
        assert!(lock.release(guard).await.unwrap());
        assert!(lock.acquire("fulcrum:party:lock:p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_with_stale_guard_does_not_delete_new_holder() {
        let kv: Arc<dyn SharedKv> = Arc::new(LocalKv::new());
        let lock = DistributedLock::new(kv.clone(), Duration::from_millis(20));
        let stale_guard = lock.acquire("fulcrum:party:lock:p1").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // TTL expired; someone else grabs the lock.
        let fresh_guard = lock.acquire("fulcrum:party:lock:p1").await.unwrap().unwrap();
        // The original holder's release must not delete the new lock.
        assert!(!lock.release(stale_guard).await.unwrap());
        assert!(lock.release(fresh_guard).await.unwrap());
    }
}
