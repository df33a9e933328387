#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shortlink_cache::domain::entities::{Link, LinkPatch, NewLink, Visit};
use shortlink_cache::domain::repositories::LinkRepository;
use shortlink_cache::error::AppError;
use shortlink_cache::infrastructure::cache::{CacheTtls, KvStore, MemoryKv};
use shortlink_cache::config::{CacheBackend, Config};
use shortlink_cache::state::AppState;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// Durable store held in memory, counting the calls the cache should absorb.
#[derive(Default)]
pub struct InMemoryLinkRepository {
    links: Mutex<Vec<Link>>,
    next_id: AtomicI64,
    pub find_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
    failing_commits: AtomicUsize,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Stores a link directly, bypassing the service.
    pub fn insert(&self, code: &str, url: &str, owner_id: Option<&str>) -> Link {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut link = Link::new(id, code.to_string(), url.to_string(), Utc::now());
        link.owner_id = owner_id.map(str::to_string);
        self.links.lock().unwrap().push(link.clone());
        link
    }

    pub fn insert_with_expiry(&self, code: &str, expires_at: DateTime<Utc>) -> Link {
        let link = self.insert(code, "https://example.com", None);
        self.update_stored(link.id, |l| l.expires_at = Some(expires_at));
        self.stored(code).unwrap()
    }

    /// Sets a stored link's visit count without going through visit commits.
    pub fn set_visit_count(&self, code: &str, count: i64) {
        let mut links = self.links.lock().unwrap();
        if let Some(link) = links.iter_mut().find(|l| l.code == code) {
            link.visit_count = count;
        }
    }

    /// Makes the next `n` commits fail with an internal error.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Current durable state of `code`.
    pub fn stored(&self, code: &str) -> Option<Link> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.code == code)
            .cloned()
    }

    pub fn finds(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    fn update_stored(&self, id: i64, f: impl FnOnce(&mut Link)) -> Option<Link> {
        let mut links = self.links.lock().unwrap();
        let link = links.iter_mut().find(|l| l.id == id)?;
        f(link);
        Some(link.clone())
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stored(code))
    }

    async fn create(&self, new_link: NewLink) -> Result<Link, AppError> {
        if self.stored(&new_link.code).is_some() {
            return Err(AppError::conflict(
                "Short code already exists",
                serde_json::json!({ "code": new_link.code }),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut link = Link::new(id, new_link.code, new_link.long_url, Utc::now())
            .with_expiry(new_link.expires_at);
        link.owner_id = new_link.owner_id;
        link.script = new_link.script;
        self.links.lock().unwrap().push(link.clone());
        Ok(link)
    }

    async fn update(&self, id: i64, patch: LinkPatch) -> Result<Option<Link>, AppError> {
        Ok(self.update_stored(id, |link| {
            if let Some(long_url) = patch.long_url {
                link.long_url = long_url;
            }
            if let Some(expires_at) = patch.expires_at {
                link.expires_at = expires_at;
            }
            if let Some(script) = patch.script {
                link.script = script;
            }
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut links = self.links.lock().unwrap();
        let before = links.len();
        links.retain(|l| l.id != id);
        Ok(links.len() < before)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Link>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut owned: Vec<Link> = self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            owned.truncate(limit as usize);
        }
        Ok(owned)
    }

    async fn most_visited(&self, limit: i64) -> Result<Vec<Link>, AppError> {
        let mut visited: Vec<Link> = self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.visit_count > 0)
            .cloned()
            .collect();
        visited.sort_by(|a, b| b.visit_count.cmp(&a.visit_count).then(a.id.cmp(&b.id)));
        visited.truncate(limit as usize);
        Ok(visited)
    }

    async fn commit_visits(&self, id: i64, visits: &[Visit]) -> Result<bool, AppError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_commits.store(failing - 1, Ordering::SeqCst);
            return Err(AppError::internal(
                "Database error",
                serde_json::json!({ "reason": "injected" }),
            ));
        }

        Ok(self
            .update_stored(id, |link| {
                link.visit_count += visits.len() as i64;
                link.visits.extend_from_slice(visits);
                link.last_visited_at = link.visits.iter().map(|v| v.visited_at).max();
            })
            .is_some())
    }
}

pub fn test_config() -> Config {
    let ttls = CacheTtls::default();
    Config {
        database_url: "postgres://localhost/test".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        cache_backend: CacheBackend::Memory,
        log_level: "info".to_string(),
        log_format: "text".to_string(),
        link_cache_ttl_seconds: ttls.link_record,
        visit_counter_ttl_seconds: ttls.visit_counter,
        owner_links_ttl_seconds: ttls.owner_links,
        visit_debounce_ms: 2000,
        visit_commit_attempts: 3,
        reconcile_interval_seconds: 30,
        popular_preload_size: 50,
        user_warmup_size: 20,
        db_max_connections: 10,
        db_connect_timeout: 30,
        db_idle_timeout: 600,
        db_max_lifetime: 1800,
    }
}

/// Wires the application over an in-memory repository and key-value store.
pub fn create_test_state() -> (
    AppState<InMemoryLinkRepository>,
    Arc<InMemoryLinkRepository>,
    Arc<MemoryKv>,
) {
    let repository = Arc::new(InMemoryLinkRepository::new());
    let kv = Arc::new(MemoryKv::new());
    let store: Arc<dyn KvStore> = kv.clone();
    let state = AppState::new(repository.clone(), store, &test_config());
    (state, repository, kv)
}
