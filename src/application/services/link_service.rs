//! Link data service: cache-aside reads and write-behind visit tracking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use super::visit_committer::{CommitterConfig, VisitCommitter};
use crate::domain::entities::{DetailedStats, Link, LinkPatch, NewLink};
use crate::domain::repositories::LinkRepository;
use crate::domain::visit_event::VisitEvent;
use crate::infrastructure::cache::LinkCache;

/// Single entry point for reading and writing link data.
///
/// Hides the cache from callers and keeps it coherent with the durable store
/// by invalidating after every successful write. Store failures are logged and
/// surface as "absent" for reads and `false` / `None` for writes.
pub struct LinkService<L: LinkRepository> {
    repository: Arc<L>,
    cache: Arc<LinkCache>,
    committer: Arc<VisitCommitter<L>>,
}

impl<L: LinkRepository> LinkService<L> {
    /// Creates a new link service and its visit committer.
    pub fn new(repository: Arc<L>, cache: Arc<LinkCache>, config: CommitterConfig) -> Self {
        let committer = Arc::new(VisitCommitter::new(
            repository.clone(),
            cache.clone(),
            config,
        ));
        Self {
            repository,
            cache,
            committer,
        }
    }

    pub fn repository(&self) -> &Arc<L> {
        &self.repository
    }

    pub fn cache(&self) -> &Arc<LinkCache> {
        &self.cache
    }

    pub fn committer(&self) -> &Arc<VisitCommitter<L>> {
        &self.committer
    }

    /// Returns the link for `code`, reading through the cache.
    ///
    /// On a hit the durable store is not touched. On a miss the record is
    /// loaded and cached before returning; a code that does not exist leaves
    /// no cache entry behind.
    pub async fn get_link_data(&self, code: &str) -> Option<Link> {
        if let Some(link) = self.cache.get_link_record(code).await {
            return Some(link);
        }

        match self.repository.find_by_code(code).await {
            Ok(Some(link)) => {
                self.cache.set_link_record(code, &link).await;
                Some(link)
            }
            Ok(None) => {
                debug!("Link {} not found", code);
                None
            }
            Err(e) => {
                warn!("Failed to load link {}: {}", code, e);
                None
            }
        }
    }

    /// Records a visit.
    ///
    /// Bumps the cached counter, resolves the link and hands the visit to the
    /// write-behind committer. Returns once the visit is buffered; the durable
    /// write happens after the debounce window.
    ///
    /// Returns `false` if the link does not exist.
    pub async fn record_visit(&self, code: &str, event: VisitEvent) -> bool {
        let pending = self.cache.increment_visit_counter(code).await;

        let Some(link) = self.get_link_data(code).await else {
            debug!("Visit to unknown link {}", code);
            return false;
        };

        self.committer.enqueue(code, link.id, event.into_visit());
        metrics::counter!("visits_recorded_total").increment(1);
        debug!("Visit buffered for {} ({} pending)", code, pending);
        true
    }

    /// Inserts a new link.
    ///
    /// Only the owner's list is invalidated; the per-code entry is populated
    /// by the first read.
    pub async fn create_link(&self, new_link: NewLink) -> Option<Link> {
        if let Err(reason) = validate_new_link(&new_link) {
            warn!("Rejected link {}: {}", new_link.code, reason);
            return None;
        }

        match self.repository.create(new_link).await {
            Ok(link) => {
                if let Some(owner_id) = &link.owner_id {
                    self.cache.invalidate_owner_links(owner_id).await;
                }
                info!("Created link {}", link.code);
                Some(link)
            }
            Err(e) => {
                warn!("Failed to create link: {}", e);
                None
            }
        }
    }

    /// Applies a partial update and invalidates the affected cache entries.
    pub async fn update_link(&self, id: i64, patch: LinkPatch) -> bool {
        if let Some(long_url) = &patch.long_url {
            if let Err(reason) = validate_destination(long_url) {
                warn!("Rejected update of link {}: {}", id, reason);
                return false;
            }
        }

        match self.repository.update(id, patch).await {
            Ok(Some(link)) => {
                self.cache.invalidate_link_record(&link.code).await;
                if let Some(owner_id) = &link.owner_id {
                    self.cache.invalidate_owner_links(owner_id).await;
                }
                true
            }
            Ok(None) => {
                debug!("Update of missing link {}", id);
                false
            }
            Err(e) => {
                warn!("Failed to update link {}: {}", id, e);
                false
            }
        }
    }

    /// Hard-deletes a link and drops everything derived from it.
    pub async fn delete_link(&self, id: i64, code: &str, owner_id: Option<&str>) -> bool {
        match self.repository.delete(id).await {
            Ok(true) => {
                let dropped = self.committer.discard(code);
                if dropped > 0 {
                    debug!("Dropped {} buffered visits of deleted link {}", dropped, code);
                }
                self.cache.invalidate_link_record(code).await;
                self.cache.clear_visit_counter(code).await;
                if let Some(owner_id) = owner_id {
                    self.cache.invalidate_owner_links(owner_id).await;
                }
                info!("Deleted link {}", code);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to delete link {}: {}", code, e);
                false
            }
        }
    }

    /// Returns an owner's links, newest first, reading through the cache.
    pub async fn get_user_links(&self, owner_id: &str) -> Vec<Link> {
        if let Some(links) = self.cache.get_owner_links(owner_id).await {
            return links;
        }

        match self.repository.list_by_owner(owner_id, None).await {
            Ok(links) => {
                self.cache.set_owner_links(owner_id, &links).await;
                links
            }
            Err(e) => {
                warn!("Failed to load links of {}: {}", owner_id, e);
                Vec::new()
            }
        }
    }

    /// True iff the link has an expiry in the past.
    pub fn is_expired(&self, link: &Link) -> bool {
        link.is_expired()
    }

    /// Exact statistics for `code`, always read from the durable store.
    pub async fn get_detailed_stats(&self, code: &str) -> Option<DetailedStats> {
        self.get_detailed_stats_at(code, Utc::now()).await
    }

    pub async fn get_detailed_stats_at(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Option<DetailedStats> {
        match self.repository.find_by_code(code).await {
            Ok(Some(link)) => Some(DetailedStats::from_link(link, now)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load stats for {}: {}", code, e);
                None
            }
        }
    }

    /// Writes every buffered visit now. Call before the process exits.
    pub async fn shutdown(&self) -> usize {
        let written = self.committer.flush_all().await;
        info!("Flushed {} buffered visits", written);
        written
    }
}

fn validate_new_link(new_link: &NewLink) -> Result<(), String> {
    if new_link.code.trim().is_empty() {
        return Err("short code is empty".to_string());
    }
    validate_destination(&new_link.long_url)
}

fn validate_destination(long_url: &str) -> Result<(), String> {
    let url = Url::parse(long_url).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Visit;
    use crate::domain::repositories::MockLinkRepository;
    use crate::error::AppError;
    use crate::infrastructure::cache::{CacheTtls, MemoryKv};
    use chrono::Duration;
    use serde_json::json;

    fn create_test_link(id: i64, code: &str) -> Link {
        Link::new(
            id,
            code.to_string(),
            "https://example.com".to_string(),
            Utc::now(),
        )
        .with_owner("owner-1")
    }

    fn service(repo: MockLinkRepository) -> (LinkService<MockLinkRepository>, Arc<LinkCache>) {
        let cache = Arc::new(LinkCache::new(
            Arc::new(MemoryKv::new()),
            CacheTtls::default(),
        ));
        let service = LinkService::new(Arc::new(repo), cache.clone(), CommitterConfig::default());
        (service, cache)
    }

    #[tokio::test]
    async fn test_get_link_data_second_read_is_cached() {
        let mut repo = MockLinkRepository::new();
        let link = create_test_link(1, "abc123");
        repo.expect_find_by_code()
            .withf(|code| code == "abc123")
            .times(1)
            .returning(move |_| Ok(Some(link.clone())));

        let (service, _) = service(repo);

        let first = service.get_link_data("abc123").await;
        let second = service.get_link_data("abc123").await;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_link_data_missing_creates_no_entry() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().times(2).returning(|_| Ok(None));

        let (service, cache) = service(repo);

        assert!(service.get_link_data("missing-code").await.is_none());
        assert!(cache.get_link_record("missing-code").await.is_none());
        assert!(service.get_link_data("missing-code").await.is_none());
    }

    #[tokio::test]
    async fn test_get_link_data_store_error_is_not_found() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .returning(|_| Err(AppError::internal("db down", json!({}))));

        let (service, _) = service(repo);

        assert!(service.get_link_data("abc123").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_visit_buffers_and_commits() {
        let mut repo = MockLinkRepository::new();
        let link = create_test_link(1, "abc123");
        repo.expect_find_by_code()
            .times(1)
            .returning(move |_| Ok(Some(link.clone())));
        repo.expect_commit_visits()
            .withf(|id, visits| *id == 1 && visits.len() == 2)
            .times(1)
            .returning(|_, _| Ok(true));

        let (service, cache) = service(repo);

        assert!(service.record_visit("abc123", VisitEvent::direct()).await);
        assert!(
            service
                .record_visit("abc123", VisitEvent::new(Some("curl"), Some("https://a.com")))
                .await
        );
        assert_eq!(cache.get_visit_counter("abc123").await, 2);
        assert_eq!(service.committer().pending_visits("abc123"), 2);

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;

        assert_eq!(cache.get_visit_counter("abc123").await, 0);
        assert!(cache.get_link_record("abc123").await.is_none());
    }

    #[tokio::test]
    async fn test_record_visit_unknown_link() {
        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));
        repo.expect_commit_visits().times(0);

        let (service, _) = service(repo);

        assert!(!service.record_visit("nope", VisitEvent::direct()).await);
        assert!(service.committer().is_idle());
    }

    #[tokio::test]
    async fn test_create_link_invalidates_owner_list_only() {
        let mut repo = MockLinkRepository::new();
        let created = create_test_link(5, "fresh1");
        repo.expect_create()
            .withf(|new_link| new_link.code == "fresh1")
            .times(1)
            .returning(move |_| Ok(created.clone()));

        let (service, cache) = service(repo);
        cache
            .set_owner_links("owner-1", &[create_test_link(1, "old")])
            .await;

        let link = service
            .create_link(NewLink {
                code: "fresh1".to_string(),
                long_url: "https://example.com".to_string(),
                expires_at: None,
                owner_id: Some("owner-1".to_string()),
                script: None,
            })
            .await;

        assert!(link.is_some());
        assert!(cache.get_owner_links("owner-1").await.is_none());
        assert!(cache.get_link_record("fresh1").await.is_none());
    }

    #[tokio::test]
    async fn test_create_link_rejects_invalid_url() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create().times(0);

        let (service, _) = service(repo);

        let result = service
            .create_link(NewLink {
                code: "bad".to_string(),
                long_url: "javascript:alert(1)".to_string(),
                expires_at: None,
                owner_id: None,
                script: None,
            })
            .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_link_conflict_returns_none() {
        let mut repo = MockLinkRepository::new();
        repo.expect_create()
            .returning(|_| Err(AppError::conflict("Unique constraint violation", json!({}))));

        let (service, _) = service(repo);

        let result = service
            .create_link(NewLink {
                code: "taken".to_string(),
                long_url: "https://example.com".to_string(),
                expires_at: None,
                owner_id: None,
                script: None,
            })
            .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_link_invalidates_record_and_owner_list() {
        let mut repo = MockLinkRepository::new();
        let mut updated = create_test_link(1, "abc123");
        updated.long_url = "https://new.example.com".to_string();
        repo.expect_update()
            .withf(|id, _| *id == 1)
            .times(1)
            .returning(move |_, _| Ok(Some(updated.clone())));

        let (service, cache) = service(repo);
        cache
            .set_link_record("abc123", &create_test_link(1, "abc123"))
            .await;
        cache
            .set_owner_links("owner-1", &[create_test_link(1, "abc123")])
            .await;

        let patch = LinkPatch {
            long_url: Some("https://new.example.com".to_string()),
            ..Default::default()
        };
        assert!(service.update_link(1, patch).await);

        assert!(cache.get_link_record("abc123").await.is_none());
        assert!(cache.get_owner_links("owner-1").await.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_link_returns_false() {
        let mut repo = MockLinkRepository::new();
        repo.expect_update().returning(|_, _| Ok(None));

        let (service, _) = service(repo);

        assert!(!service.update_link(99, LinkPatch::default()).await);
    }

    #[tokio::test]
    async fn test_delete_link_drops_derived_state() {
        let mut repo = MockLinkRepository::new();
        repo.expect_delete()
            .withf(|id| *id == 1)
            .times(1)
            .returning(|_| Ok(true));

        let (service, cache) = service(repo);
        cache
            .set_link_record("abc123", &create_test_link(1, "abc123"))
            .await;
        cache.increment_visit_counter("abc123").await;
        cache
            .set_owner_links("owner-1", &[create_test_link(1, "abc123")])
            .await;

        assert!(service.delete_link(1, "abc123", Some("owner-1")).await);

        assert!(cache.get_link_record("abc123").await.is_none());
        assert_eq!(cache.get_visit_counter("abc123").await, 0);
        assert!(cache.get_owner_links("owner-1").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_cache() {
        let mut repo = MockLinkRepository::new();
        repo.expect_delete()
            .returning(|_| Err(AppError::internal("db down", json!({}))));

        let (service, cache) = service(repo);
        cache
            .set_link_record("abc123", &create_test_link(1, "abc123"))
            .await;

        assert!(!service.delete_link(1, "abc123", None).await);
        assert!(cache.get_link_record("abc123").await.is_some());
    }

    #[tokio::test]
    async fn test_get_user_links_cache_aside() {
        let mut repo = MockLinkRepository::new();
        let links = vec![create_test_link(2, "b"), create_test_link(1, "a")];
        repo.expect_list_by_owner()
            .withf(|owner, limit| owner == "owner-1" && limit.is_none())
            .times(1)
            .returning(move |_, _| Ok(links.clone()));

        let (service, _) = service(repo);

        let first = service.get_user_links("owner-1").await;
        let second = service.get_user_links("owner-1").await;

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_user_links_store_error_is_empty() {
        let mut repo = MockLinkRepository::new();
        repo.expect_list_by_owner()
            .returning(|_, _| Err(AppError::internal("db down", json!({}))));

        let (service, _) = service(repo);

        assert!(service.get_user_links("owner-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_is_expired() {
        let (service, _) = service(MockLinkRepository::new());

        let past = create_test_link(1, "a").with_expiry(Some(Utc::now() - Duration::seconds(1)));
        let future = create_test_link(2, "b").with_expiry(Some(Utc::now() + Duration::hours(1)));
        let never = create_test_link(3, "c");

        assert!(service.is_expired(&past));
        assert!(!service.is_expired(&future));
        assert!(!service.is_expired(&never));
    }

    #[tokio::test]
    async fn test_detailed_stats_bypass_cache() {
        let now = Utc::now();
        let mut durable = create_test_link(1, "abc123");
        durable.visits = vec![Visit::new(now - Duration::hours(1), None, None)];
        durable.visit_count = 1;

        let mut repo = MockLinkRepository::new();
        repo.expect_find_by_code()
            .times(2)
            .returning(move |_| Ok(Some(durable.clone())));

        let (service, cache) = service(repo);

        let cold = service.get_detailed_stats_at("abc123", now).await;

        let mut stale = create_test_link(1, "abc123");
        stale.visit_count = 999;
        cache.set_link_record("abc123", &stale).await;

        let warm = service.get_detailed_stats_at("abc123", now).await;

        assert_eq!(cold, warm);
        let stats = warm.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.last_day, 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_visits() {
        let mut repo = MockLinkRepository::new();
        let link = create_test_link(1, "abc123");
        repo.expect_find_by_code()
            .returning(move |_| Ok(Some(link.clone())));
        repo.expect_commit_visits()
            .times(1)
            .returning(|_, _| Ok(true));

        let (service, _) = service(repo);
        service.record_visit("abc123", VisitEvent::direct()).await;

        assert_eq!(service.shutdown().await, 1);
    }
}
