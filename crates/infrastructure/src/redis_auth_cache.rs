//! Redis-backed authorization cache.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use warden_application::AuthCache;
use warden_core::{AppError, AppResult};

/// Redis implementation of the authorization cache port.
///
/// Keys are prefixed so one Redis instance can serve several
/// deployments without collisions.
#[derive(Clone)]
pub struct RedisAuthCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisAuthCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
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
impl AuthCache for RedisAuthCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection
            .get(self.key_for(key))
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to read cache entry: {error}")))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let mut connection = self.connection().await?;
        connection
            .set_ex(self.key_for(key), value, u64::from(ttl_seconds))
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to write cache entry: {error}")))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del(self.key_for(key))
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to delete cache entry: {error}")))
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        let prefixed = self.key_for(pattern);

        // SCAN instead of KEYS: pattern enumeration must not block the server.
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(prefixed.as_str())
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::Unavailable(format!("failed to scan cache keys: {error}"))
                })?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = connection.del(keys).await.map_err(|error| {
            AppError::Unavailable(format!("failed to delete scanned cache keys: {error}"))
        })?;

        Ok(deleted)
    }
}
