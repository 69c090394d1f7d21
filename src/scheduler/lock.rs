use crate::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Named, TTL-bounded mutual exclusion across service instances
///
/// A crashed holder must never block future acquisitions, so every lock
/// expires on its own; explicit release is just the fast path.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to take the lock once. Returns false if someone else holds it.
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Release the lock if (and only if) `holder` still owns it.
    async fn release(&self, key: &str, holder: &str) -> Result<()>;
}

/// Redis-backed lock store (SET NX PX)
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        Ok(Self { conn })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        // Holder check and delete are two steps; the TTL bounds the stale
        // window if the process dies in between.
        let current: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        if current.as_deref() == Some(holder) {
            let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        }

        Ok(())
    }
}

/// In-process lock store for tests and single-instance runs
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();

        if let Some((_, expires_at)) = entries.get(key) {
            if Instant::now() < *expires_at {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), (holder.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((current, _)) = entries.get(key) {
            if current == holder {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_acquires_one_winner() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(60);

        let (a, b) = tokio::join!(
            store.acquire("lock:job", "holder-a", ttl),
            store.acquire("lock:job", "holder-b", ttl),
        );

        let wins = [a.unwrap(), b.unwrap()];
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
    }

    #[tokio::test]
    async fn test_release_frees_lock() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.acquire("lock:job", "holder-a", ttl).await.unwrap());
        assert!(!store.acquire("lock:job", "holder-b", ttl).await.unwrap());

        store.release("lock:job", "holder-a").await.unwrap();
        assert!(store.acquire("lock:job", "holder-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_ignored() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.acquire("lock:job", "holder-a", ttl).await.unwrap());
        store.release("lock:job", "holder-b").await.unwrap();

        assert!(!store.acquire("lock:job", "holder-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiry_allows_takeover() {
        let store = MemoryLockStore::new();

        assert!(store
            .acquire("lock:job", "holder-a", Duration::from_millis(10))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Crashed holder: TTL has expired, the lock is free again
        assert!(store
            .acquire("lock:job", "holder-b", Duration::from_secs(60))
            .await
            .unwrap());
    }
}
