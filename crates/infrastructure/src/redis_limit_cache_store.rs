//! Redis-backed limit cache store.

use async_trait::async_trait;
use limitgate_application::LimitCacheStore;
use limitgate_core::{AppError, AppResult};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Script};

const INCREMENT_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])

local count = redis.call('INCR', key)
if redis.call('TTL', key) < 0 then
  redis.call('EXPIRE', key, window)
end

return count
"#;

const SCAN_BATCH_SIZE: usize = 500;

/// Redis implementation of the limit cache store port.
#[derive(Clone)]
pub struct RedisLimitCacheStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLimitCacheStore {
    /// Creates a store with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl LimitCacheStore for RedisLimitCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<i64>> {
        let mut connection = self.connection().await?;
        connection
            .get(self.key_for(key))
            .await
            .map_err(|error| redis_error("failed to read limit counter", error))
    }

    async fn add(&self, key: &str, value: i64, ttl_seconds: u64) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let stored: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut connection)
            .await
            .map_err(|error| redis_error("failed to write lockout marker", error))?;

        Ok(stored.is_some())
    }

    async fn increment(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let mut connection = self.connection().await?;
        Script::new(INCREMENT_SCRIPT)
            .key(self.key_for(key))
            .arg(ttl_seconds.max(1))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| redis_error("failed to increment limit counter", error))
    }

    async fn forget(&self, key: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key_for(key))
            .query_async(&mut connection)
            .await
            .map_err(|error| redis_error("failed to delete limit counter", error))?;

        Ok(removed > 0)
    }

    async fn flush(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let pattern = format!("{}:*", self.key_prefix);
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut connection)
                .await
                .map_err(|error| redis_error("failed to scan limit counters", error))?;

            if !keys.is_empty() {
                let _: i64 = redis::cmd("DEL")
                    .arg(keys)
                    .query_async(&mut connection)
                    .await
                    .map_err(|error| redis_error("failed to flush limit counters", error))?;
            }

            if next_cursor == 0 {
                return Ok(());
            }
            cursor = next_cursor;
        }
    }
}

fn redis_error(context: &str, error: RedisError) -> AppError {
    if error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
    {
        AppError::Unavailable(format!("{context}: {error}"))
    } else {
        AppError::Internal(format!("{context}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use limitgate_application::LimitCacheStore;

    use super::RedisLimitCacheStore;

    fn test_store(prefix: &str) -> Option<RedisLimitCacheStore> {
        let Ok(redis_url) = std::env::var("REDIS_URL") else {
            return None;
        };

        match redis::Client::open(redis_url) {
            Ok(client) => Some(RedisLimitCacheStore::new(client, prefix)),
            Err(error) => panic!("failed to open REDIS_URL in test: {error}"),
        }
    }

    #[tokio::test]
    async fn increment_creates_counter_with_window() {
        let Some(store) = test_store("limitgate-test-increment") else {
            return;
        };
        assert!(store.flush().await.is_ok());

        assert_eq!(store.increment("instance.minute", 60).await.ok(), Some(1));
        assert_eq!(store.increment("instance.minute", 60).await.ok(), Some(2));
        assert_eq!(store.get("instance.minute").await.ok(), Some(Some(2)));

        assert!(store.flush().await.is_ok());
        assert_eq!(store.get("instance.minute").await.ok(), Some(None));
    }

    #[tokio::test]
    async fn add_only_stores_absent_keys() {
        let Some(store) = test_store("limitgate-test-add") else {
            return;
        };
        assert!(store.flush().await.is_ok());

        assert_eq!(store.add("marker", 10, 60).await.ok(), Some(true));
        assert_eq!(store.add("marker", 20, 60).await.ok(), Some(false));
        assert_eq!(store.get("marker").await.ok(), Some(Some(10)));
        assert_eq!(store.forget("marker").await.ok(), Some(true));
        assert_eq!(store.forget("marker").await.ok(), Some(false));
    }
}
