use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::collections::VecDeque;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::utils::error::MemoryError;

/// Append-only list storage addressed by string keys.
///
/// Appending to a missing key creates it. Implementations must apply the
/// append and the trim as one step so readers never observe a window longer
/// than `max_len`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends `entries` in order, then drops the oldest entries beyond `max_len`.
    async fn append(&self, key: &str, entries: &[String], max_len: usize)
        -> Result<(), MemoryError>;

    /// Returns at most `count` newest entries, oldest first. Missing keys yield `[]`.
    async fn tail(&self, key: &str, count: usize) -> Result<Vec<String>, MemoryError>;

    async fn ping(&self) -> Result<(), MemoryError>;
}

/// Redis lists: `RPUSH` + `LTRIM` (+ `EXPIRE`) in a MULTI block, `LRANGE` to read.
pub struct RedisHistoryStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    ttl_seconds: Option<u64>,
}

impl RedisHistoryStore {
    /// Validates the URL only; the connection is opened on first use.
    pub fn new(redis_url: &str, ttl_seconds: Option<u64>) -> Result<Self, MemoryError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| MemoryError::History(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            ttl_seconds,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, MemoryError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                info!("Connecting to Redis history store");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(|e| MemoryError::History(format!("Failed to connect to Redis: {}", e)))?;

        // ConnectionManager is a cheap handle over one multiplexed connection
        Ok(manager.clone())
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append(
        &self,
        key: &str,
        entries: &[String],
        max_len: usize,
    ) -> Result<(), MemoryError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let keep_from = -(max_len.max(1) as i64);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("RPUSH")
            .arg(key)
            .arg(entries)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(keep_from)
            .arg(-1)
            .ignore();

        if let Some(ttl) = self.ttl_seconds {
            pipe.cmd("EXPIRE").arg(key).arg(ttl).ignore();
        }

        pipe.query_async::<()>(&mut conn).await?;
        debug!("Appended {} entries to {}", entries.len(), key);

        Ok(())
    }

    async fn tail(&self, key: &str, count: usize) -> Result<Vec<String>, MemoryError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(-(count as i64))
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        Ok(entries)
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local store for development and tests. Windows vanish on restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    windows: DashMap<String, VecDeque<String>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        key: &str,
        entries: &[String],
        max_len: usize,
    ) -> Result<(), MemoryError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut window = self.windows.entry(key.to_string()).or_default();
        window.extend(entries.iter().cloned());
        while window.len() > max_len.max(1) {
            window.pop_front();
        }

        Ok(())
    }

    async fn tail(&self, key: &str, count: usize) -> Result<Vec<String>, MemoryError> {
        let Some(window) = self.windows.get(key) else {
            return Ok(Vec::new());
        };

        let skip = window.len().saturating_sub(count);
        Ok(window.iter().skip(skip).cloned().collect())
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_key_is_empty() {
        let store = InMemoryHistoryStore::new();
        assert!(store.tail("companion:x:m:u", 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_trims_oldest() {
        let store = InMemoryHistoryStore::new();
        store.append("k", &turns(&["1", "2", "3"]), 4).await.unwrap();
        store.append("k", &turns(&["4", "5"]), 4).await.unwrap();
        assert_eq!(store.tail("k", 10).await.unwrap(), turns(&["2", "3", "4", "5"]));
    }

    #[tokio::test]
    async fn test_tail_returns_newest_in_order() {
        let store = InMemoryHistoryStore::new();
        store.append("k", &turns(&["a", "b", "c"]), 10).await.unwrap();
        assert_eq!(store.tail("k", 2).await.unwrap(), turns(&["b", "c"]));
        assert!(store.tail("k", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_append_does_not_create_key() {
        let store = InMemoryHistoryStore::new();
        store.append("k", &[], 10).await.unwrap();
        assert!(store.windows.get("k").is_none());
    }

    /// Runs against a live server only when `REDIS_URL` is set.
    fn redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty())
    }

    #[tokio::test]
    async fn test_redis_append_trims_and_expires() {
        let Some(url) = redis_url() else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };

        let store = RedisHistoryStore::new(&url, Some(600)).unwrap();
        let key = format!("companion:test-{}:m:u", uuid::Uuid::new_v4());

        store.ping().await.unwrap();
        assert!(store.tail(&key, 30).await.unwrap().is_empty());

        store.append(&key, &turns(&["1", "2", "3"]), 4).await.unwrap();
        store.append(&key, &turns(&["4", "5"]), 4).await.unwrap();

        assert_eq!(store.tail(&key, 10).await.unwrap(), turns(&["2", "3", "4", "5"]));
        assert_eq!(store.tail(&key, 2).await.unwrap(), turns(&["4", "5"]));

        let mut conn = store.connection().await.unwrap();
        let len: i64 = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await.unwrap();
        assert_eq!(len, 4);
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(ttl > 0 && ttl <= 600, "unexpected ttl {}", ttl);

        let _: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_without_ttl_does_not_expire() {
        let Some(url) = redis_url() else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };

        let store = RedisHistoryStore::new(&url, None).unwrap();
        let key = format!("companion:test-{}:m:u", uuid::Uuid::new_v4());
        store.append(&key, &turns(&["only"]), 30).await.unwrap();

        let mut conn = store.connection().await.unwrap();
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert_eq!(ttl, -1);

        let _: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();
    }

    #[test]
    fn test_redis_store_rejects_bad_url() {
        assert!(RedisHistoryStore::new("not a url", None).is_err());
        assert!(RedisHistoryStore::new("redis://127.0.0.1:6379/", Some(3600)).is_ok());
    }
}
