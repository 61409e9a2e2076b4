//! Distributed sync lock
//!
//! A named, TTL-bound mutual-exclusion primitive used to serialize
//! cluster-wide jobs (catalog sync, global recomputes) so only one process
//! instance runs them at a time. Failing to acquire is not an error: it
//! means another instance is already on it, and the caller returns without
//! doing work.
//!
//! Backed by Redis `SET NX EX` in production; [`MemorySyncLock`] provides
//! the same semantics in-process for tests and single-node runs.

use async_trait::async_trait;
use deadpool_redis::Pool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Named TTL lock
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Try to take the lock. Returns false when someone else holds it.
    ///
    /// The lock expires on its own after `ttl`; use [`release`] (or a
    /// [`LockGuard`]) to free it earlier.
    ///
    /// [`release`]: SyncLock::release
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool>;

    /// Free the lock before its TTL runs out
    async fn release(&self, name: &str) -> Result<()>;
}

/// Acquire a lock and get back a guard that must be released explicitly.
///
/// Returns None when the lock is already held elsewhere.
pub async fn acquire_guarded(
    lock: &Arc<dyn SyncLock>,
    name: &str,
    ttl: Duration,
) -> Result<Option<LockGuard>> {
    if !lock.acquire(name, ttl).await? {
        return Ok(None);
    }
    Ok(Some(LockGuard {
        lock: Arc::clone(lock),
        name: name.to_string(),
        released: false,
    }))
}

/// Holds an acquired lock until [`LockGuard::release`] is called.
///
/// Dropping the guard without releasing leaves the key to expire via TTL,
/// which is the intended behavior for TTL-only jobs.
pub struct LockGuard {
    lock: Arc<dyn SyncLock>,
    name: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock now instead of waiting for the TTL
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release(&self.name).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(name = %self.name, "lock guard dropped, key left to expire via TTL");
        }
    }
}

// ============================================================================
// Redis Implementation
// ============================================================================

/// Redis-backed lock using atomic `SET NX EX`
pub struct RedisSyncLock {
    pool: Pool,
    key_prefix: String,
}

impl RedisSyncLock {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.key_prefix, name)
    }
}

#[async_trait]
impl SyncLock for RedisSyncLock {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(name))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, name: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("DEL")
            .arg(self.key(name))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Single-process lock with the same acquire/expire semantics
#[derive(Default)]
pub struct MemorySyncLock {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemorySyncLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncLock for MemorySyncLock {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let mut held = self.held.lock().unwrap();
        let now = Instant::now();
        match held.get(name) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                held.insert(name.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str) -> Result<()> {
        self.held.lock().unwrap().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_lock_exclusion() {
        let lock = MemorySyncLock::new();
        assert!(lock.acquire("job", Duration::from_secs(60)).await.unwrap());
        assert!(!lock.acquire("job", Duration::from_secs(60)).await.unwrap());

        // A different name is independent
        assert!(lock.acquire("other", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_lock_expiry() {
        let lock = MemorySyncLock::new();
        assert!(lock.acquire("job", Duration::from_millis(10)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(lock.acquire("job", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_lock_release() {
        let lock = MemorySyncLock::new();
        assert!(lock.acquire("job", Duration::from_secs(60)).await.unwrap());
        lock.release("job").await.unwrap();
        assert!(lock.acquire("job", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_guarded_acquire() {
        let lock: Arc<dyn SyncLock> = Arc::new(MemorySyncLock::new());

        let guard = acquire_guarded(&lock, "job", Duration::from_secs(60))
            .await
            .unwrap()
            .expect("first acquire succeeds");

        assert!(acquire_guarded(&lock, "job", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());

        guard.release().await.unwrap();
        assert!(acquire_guarded(&lock, "job", Duration::from_secs(60))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let lock: Arc<dyn SyncLock> = Arc::new(MemorySyncLock::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                lock.acquire("contended", Duration::from_secs(60)).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
