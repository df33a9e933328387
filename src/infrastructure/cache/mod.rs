//! Caching layer for link records and visit counters.
//!
//! - [`KvStore`] - the key-value store contract, with two implementations:
//!   [`RedisKv`] (production) and [`MemoryKv`] (tests and local runs)
//! - [`LinkCache`] - typed, failure-tolerant access used by the services

mod link_cache;
mod memory_cache;
mod redis_cache;
mod service;

pub use link_cache::{CacheTtls, LinkCache};
pub use memory_cache::MemoryKv;
pub use redis_cache::RedisKv;
pub use service::{CacheError, CacheResult, KvStore};

#[cfg(test)]
pub use service::MockKvStore;
