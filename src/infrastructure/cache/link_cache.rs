//! Typed cache access for link records, visit counters and owner link lists.

use std::sync::Arc;

use super::service::{CacheError, CacheResult, KvStore};
use crate::domain::entities::Link;
use tracing::{debug, warn};

/// Expiry applied to each cache namespace, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub link_record: u64,
    pub visit_counter: u64,
    pub owner_links: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            link_record: 300,
            visit_counter: 60,
            owner_links: 120,
        }
    }
}

/// Failure-tolerant typed wrapper over a [`KvStore`].
///
/// Every operation exists twice: a `try_*` method returning [`CacheResult`]
/// and a public boundary method that logs the error and degrades to "not
/// cached" or a no-op. Callers of the boundary methods never see a cache
/// failure.
///
/// Keys live in three disjoint namespaces:
///
/// - `link:{code}` - JSON snapshot of a [`Link`]
/// - `visits:{code}` - visits not yet committed to the durable store
/// - `user_links:{owner}` - JSON list of an owner's links
pub struct LinkCache {
    store: Arc<dyn KvStore>,
    ttls: CacheTtls,
}

impl LinkCache {
    pub fn new(store: Arc<dyn KvStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn link_key(code: &str) -> String {
        format!("link:{}", code)
    }

    pub fn counter_key(code: &str) -> String {
        format!("visits:{}", code)
    }

    pub fn owner_key(owner_id: &str) -> String {
        format!("user_links:{}", owner_id)
    }

    // ── link records ────────────────────────────────────────────────────────

    pub async fn try_get_link_record(&self, code: &str) -> CacheResult<Option<Link>> {
        match self.store.get(&Self::link_key(code)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Returns the cached snapshot, or `None` on miss or error.
    ///
    /// A snapshot that no longer decodes is dropped so the next read
    /// repopulates it.
    pub async fn get_link_record(&self, code: &str) -> Option<Link> {
        match self.try_get_link_record(code).await {
            Ok(Some(link)) => {
                debug!("Cache HIT: link {}", code);
                metrics::counter!("cache_hits_total", "entity" => "link").increment(1);
                Some(link)
            }
            Ok(None) => {
                debug!("Cache MISS: link {}", code);
                metrics::counter!("cache_misses_total", "entity" => "link").increment(1);
                None
            }
            Err(e @ CacheError::SerializationError(_)) => {
                warn!("Discarding undecodable cached link {}: {}", code, e);
                self.invalidate_link_record(code).await;
                None
            }
            Err(e) => {
                warn!("Cache GET failed for link {}: {}", code, e);
                None
            }
        }
    }

    pub async fn try_set_link_record(&self, code: &str, link: &Link) -> CacheResult<()> {
        let raw = serde_json::to_string(link)?;
        self.store
            .set_ex(&Self::link_key(code), &raw, self.ttls.link_record)
            .await
    }

    pub async fn set_link_record(&self, code: &str, link: &Link) {
        match self.try_set_link_record(code, link).await {
            Ok(()) => debug!(
                "Cache SET: link {} (TTL: {}s)",
                code, self.ttls.link_record
            ),
            Err(e) => warn!("Cache SET failed for link {}: {}", code, e),
        }
    }

    pub async fn try_invalidate_link_record(&self, code: &str) -> CacheResult<()> {
        self.store.del(&Self::link_key(code)).await
    }

    pub async fn invalidate_link_record(&self, code: &str) {
        match self.try_invalidate_link_record(code).await {
            Ok(()) => debug!("Cache INVALIDATE: link {}", code),
            Err(e) => warn!("Cache DEL failed for link {}: {}", code, e),
        }
    }

    // ── visit counters ──────────────────────────────────────────────────────

    /// Increments the counter and refreshes its TTL.
    pub async fn try_increment_visit_counter(&self, code: &str) -> CacheResult<i64> {
        let key = Self::counter_key(code);
        let count = self.store.incr(&key).await?;
        self.store.expire(&key, self.ttls.visit_counter).await?;
        Ok(count)
    }

    /// Returns the new count, or `0` if the store is unavailable.
    pub async fn increment_visit_counter(&self, code: &str) -> i64 {
        match self.try_increment_visit_counter(code).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Cache INCR failed for {}: {}", code, e);
                0
            }
        }
    }

    pub async fn try_get_visit_counter(&self, code: &str) -> CacheResult<i64> {
        match self.store.get(&Self::counter_key(code)).await? {
            Some(raw) => raw.trim().parse().map_err(|_| {
                CacheError::SerializationError(format!("counter for {} is not an integer", code))
            }),
            None => Ok(0),
        }
    }

    pub async fn get_visit_counter(&self, code: &str) -> i64 {
        self.try_get_visit_counter(code).await.unwrap_or_else(|e| {
            warn!("Cache GET failed for counter {}: {}", code, e);
            0
        })
    }

    pub async fn try_clear_visit_counter(&self, code: &str) -> CacheResult<()> {
        self.store.del(&Self::counter_key(code)).await
    }

    pub async fn clear_visit_counter(&self, code: &str) {
        if let Err(e) = self.try_clear_visit_counter(code).await {
            warn!("Cache DEL failed for counter {}: {}", code, e);
        }
    }

    // ── owner link lists ────────────────────────────────────────────────────

    pub async fn try_get_owner_links(&self, owner_id: &str) -> CacheResult<Option<Vec<Link>>> {
        match self.store.get(&Self::owner_key(owner_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_owner_links(&self, owner_id: &str) -> Option<Vec<Link>> {
        match self.try_get_owner_links(owner_id).await {
            Ok(Some(links)) => {
                debug!("Cache HIT: links of {}", owner_id);
                metrics::counter!("cache_hits_total", "entity" => "owner_links").increment(1);
                Some(links)
            }
            Ok(None) => {
                metrics::counter!("cache_misses_total", "entity" => "owner_links").increment(1);
                None
            }
            Err(e) => {
                warn!("Cache GET failed for links of {}: {}", owner_id, e);
                None
            }
        }
    }

    pub async fn try_set_owner_links(&self, owner_id: &str, links: &[Link]) -> CacheResult<()> {
        let raw = serde_json::to_string(links)?;
        self.store
            .set_ex(&Self::owner_key(owner_id), &raw, self.ttls.owner_links)
            .await
    }

    pub async fn set_owner_links(&self, owner_id: &str, links: &[Link]) {
        if let Err(e) = self.try_set_owner_links(owner_id, links).await {
            warn!("Cache SET failed for links of {}: {}", owner_id, e);
        }
    }

    pub async fn try_invalidate_owner_links(&self, owner_id: &str) -> CacheResult<()> {
        self.store.del(&Self::owner_key(owner_id)).await
    }

    pub async fn invalidate_owner_links(&self, owner_id: &str) {
        if let Err(e) = self.try_invalidate_owner_links(owner_id).await {
            warn!("Cache DEL failed for links of {}: {}", owner_id, e);
        }
    }

    /// Checks if the cache backend is healthy.
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }
}
