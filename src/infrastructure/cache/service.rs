//! Key-value store trait and cache error types.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during cache operations.
///
/// These never reach callers of [`super::LinkCache`]'s public methods; they are
/// logged there and turned into a miss or a no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),
    #[error("Cache operation error: {0}")]
    OperationError(String),
    #[error("Cache serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A networked, TTL-aware string key-value store.
///
/// Expiry is the only eviction mechanism the cache layer relies on.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisKv`] - Redis, connected lazily
/// - [`crate::infrastructure::cache::MemoryKv`] - In-process store for tests and local runs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Atomically increments the integer under `key` (missing counts as 0)
    /// and returns the new value. An existing TTL is kept.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Sets the TTL of an existing key. No-op when the key is absent.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Checks if the backend is reachable.
    async fn health_check(&self) -> bool;
}
