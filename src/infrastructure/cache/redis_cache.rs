//! Redis-backed key-value store.

use super::service::{CacheError, CacheResult, KvStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Redis implementation of [`KvStore`].
///
/// The connection is established lazily on first use and then reused through
/// a `ConnectionManager`, which reconnects on its own after transient failures.
/// A failed first connection is reported as [`CacheError::ConnectionError`] and
/// attempted again on the next call.
pub struct RedisKv {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisKv {
    /// Creates a store for `redis_url` without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL cannot be parsed.
    pub fn new(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    /// Creates a store and validates the connection with a PING.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let store = Self::new(redis_url)?;
        let mut conn = store.connection().await?;
        conn.ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {}", e)))?;

        info!("✓ Connected to Redis");
        Ok(store)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                debug!("Opening Redis connection");
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| {
                        CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
                    })
            })
            .await?;

        Ok(manager.clone())
    }
}

fn op_error(op: &str, key: &str, e: redis::RedisError) -> CacheError {
    CacheError::OperationError(format!("Redis {} failed for {}: {}", op, key, e))
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| op_error("GET", key, e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(|e| op_error("SET", key, e))
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let deleted = conn
            .del::<_, i64>(key)
            .await
            .map_err(|e| op_error("DEL", key, e))?;
        if deleted > 0 {
            debug!("Redis DEL {}", key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.connection().await?;
        conn.incr::<_, _, i64>(key, 1)
            .await
            .map_err(|e| op_error("INCR", key, e))
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.expire::<_, ()>(key, ttl_seconds as i64)
            .await
            .map_err(|e| op_error("EXPIRE", key, e))
    }

    async fn health_check(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => conn.ping::<()>().await.is_ok(),
            Err(_) => false,
        }
    }
}
