use crate::api::DailyClose;
use crate::Result;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

/// Stored daily close for Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredClose {
    close: f64,
    date: DateTime<Utc>,
}

/// Redis persistence for daily close history
///
/// Uses sorted sets with the close date as score, so time-range loads and
/// retention cleanup are single commands. Cloneable; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct RedisHistory {
    conn: ConnectionManager,
}

impl RedisHistory {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Save daily closes for a ticker
    ///
    /// Stores in sorted set: `closes:{ticker}` with the date as score
    pub async fn save_closes(&mut self, ticker: &str, closes: &[DailyClose]) -> Result<()> {
        let key = format!("closes:{}", ticker);

        for close in closes {
            let stored = StoredClose {
                close: close.close,
                date: close.date,
            };

            let value = serde_json::to_string(&stored)?;
            let score = close.date.timestamp() as f64;

            self.conn.zadd::<_, _, _, ()>(&key, value, score).await?;
        }

        tracing::debug!("Saved {} closes for {} to Redis", closes.len(), ticker);

        Ok(())
    }

    /// Load recent closes for a ticker, oldest first
    pub async fn load_closes(&mut self, ticker: &str, days_back: u32) -> Result<Vec<DailyClose>> {
        let key = format!("closes:{}", ticker);

        let cutoff = Utc::now() - chrono::Duration::days(days_back as i64);
        let min_score = cutoff.timestamp() as f64;

        let results: Vec<String> = self.conn.zrangebyscore(&key, min_score, "+inf").await?;

        let mut closes = Vec::with_capacity(results.len());
        for json_str in results {
            let stored: StoredClose = serde_json::from_str(&json_str)?;
            closes.push(DailyClose {
                date: stored.date,
                close: stored.close,
            });
        }

        Ok(closes)
    }

    /// Remove closes older than the retention window
    pub async fn cleanup_old(&mut self, ticker: &str, keep_days: u32) -> Result<usize> {
        let key = format!("closes:{}", ticker);

        let cutoff = Utc::now() - chrono::Duration::days(keep_days as i64);
        let max_score = cutoff.timestamp() as f64;

        let removed: usize = self.conn.zrembyscore(&key, "-inf", max_score).await?;

        if removed > 0 {
            tracing::debug!("Cleaned up {} old closes for {}", removed, ticker);
        }

        Ok(removed)
    }

    /// Count stored closes for a ticker
    pub async fn count_closes(&mut self, ticker: &str) -> Result<usize> {
        let key = format!("closes:{}", ticker);
        let count: usize = self.conn.zcard(&key).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_days_ago(days: i64, close: f64) -> DailyClose {
        DailyClose {
            date: Utc::now() - chrono::Duration::days(days),
            close,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load_closes() {
        let mut history = RedisHistory::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = history.cleanup_old("TEST_SAVE", 0).await;

        let closes = vec![
            close_days_ago(3, 100.0),
            close_days_ago(2, 101.5),
            close_days_ago(1, 99.8),
        ];
        history.save_closes("TEST_SAVE", &closes).await.unwrap();

        let loaded = history.load_closes("TEST_SAVE", 7).await.unwrap();
        assert_eq!(loaded.len(), 3);
        // Oldest first
        assert_eq!(loaded[0].close, 100.0);
        assert_eq!(loaded[2].close, 99.8);

        let _ = history.cleanup_old("TEST_SAVE", 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_cleanup_old_closes() {
        let mut history = RedisHistory::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = history.cleanup_old("TEST_CLEANUP", 0).await;

        let closes = vec![close_days_ago(90, 50.0), close_days_ago(1, 60.0)];
        history.save_closes("TEST_CLEANUP", &closes).await.unwrap();

        let removed = history.cleanup_old("TEST_CLEANUP", 60).await.unwrap();
        assert_eq!(removed, 1);

        let count = history.count_closes("TEST_CLEANUP").await.unwrap();
        assert_eq!(count, 1);

        let _ = history.cleanup_old("TEST_CLEANUP", 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_load_unknown_ticker_is_empty() {
        let mut history = RedisHistory::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let loaded = history.load_closes("NO_SUCH_TICKER", 30).await.unwrap();
        assert!(loaded.is_empty());
    }
}
