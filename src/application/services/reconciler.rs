//! Background reconciliation loop.
//!
//! Runs housekeeping on a fixed interval: restarts parked visit batches and
//! preloads the most visited links into the cache. Stale entries are left to
//! the key-value store's own TTL expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::link_service::LinkService;
use super::visit_committer::VisitCommitter;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::cache::LinkCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// How many of the most visited links to keep warm.
    pub popular_batch_size: i64,
    /// How many of an owner's newest links [`Reconciler::warmup_user_cache`] loads.
    pub warmup_batch_size: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            popular_batch_size: 50,
            warmup_batch_size: 20,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub restarted_batches: usize,
    pub preloaded: usize,
    pub already_cached: usize,
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic housekeeping over the link cache.
///
/// Constructed explicitly with its dependencies and started/stopped by the
/// owner's lifecycle; there is no process-wide instance.
pub struct Reconciler<L: LinkRepository> {
    repository: Arc<L>,
    cache: Arc<LinkCache>,
    committer: Arc<VisitCommitter<L>>,
    config: ReconcilerConfig,
    running: Mutex<Option<RunningLoop>>,
}

impl<L: LinkRepository> Reconciler<L> {
    pub fn new(
        repository: Arc<L>,
        cache: Arc<LinkCache>,
        committer: Arc<VisitCommitter<L>>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            repository,
            cache,
            committer,
            config,
            running: Mutex::new(None),
        }
    }

    /// Builds a reconciler sharing the service's repository, cache and committer.
    pub fn for_service(service: &LinkService<L>, config: ReconcilerConfig) -> Self {
        Self::new(
            service.repository().clone(),
            service.cache().clone(),
            service.committer().clone(),
            config,
        )
    }

    pub fn config(&self) -> ReconcilerConfig {
        self.config
    }

    /// Starts the interval loop. Returns `false` if it was already running.
    ///
    /// The first pass runs one interval after start.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let this = Arc::clone(self);
        let child = token.clone();
        let task = tokio::spawn(async move { this.run_loop(child).await });

        *running = Some(RunningLoop { token, task });
        info!(
            "Reconciler started (every {}s)",
            self.config.interval.as_secs_f64()
        );
        true
    }

    /// Stops the loop and waits for it to exit. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };

        running.token.cancel();
        if let Err(e) = running.task.await {
            warn!("Reconciler task ended abnormally: {}", e);
        }
        info!("Reconciler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn run_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
    }

    /// Runs one housekeeping pass. Failures are logged, never raised.
    pub async fn run_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport {
            restarted_batches: self.committer.flush_pending(),
            ..Default::default()
        };
        if report.restarted_batches > 0 {
            info!(
                "Restarted {} parked visit batches",
                report.restarted_batches
            );
        }

        // Expired entries are evicted by the store's TTL; nothing to sweep.

        match self.repository.most_visited(self.config.popular_batch_size).await {
            Ok(links) => {
                for link in &links {
                    if self.cache.get_link_record(&link.code).await.is_some() {
                        report.already_cached += 1;
                        continue;
                    }
                    self.cache.set_link_record(&link.code, link).await;
                    report.preloaded += 1;
                }
                metrics::counter!("reconcile_preloaded_total").increment(report.preloaded as u64);
            }
            Err(e) => warn!("Failed to load popular links: {}", e),
        }

        debug!(
            "Reconcile pass: {} preloaded, {} already cached, {} batches restarted",
            report.preloaded, report.already_cached, report.restarted_batches
        );
        report
    }

    /// Drops the cached record for `code` and, if known, the owner's list.
    pub async fn invalidate_link(&self, code: &str, owner_id: Option<&str>) {
        self.cache.invalidate_link_record(code).await;
        if let Some(owner_id) = owner_id {
            self.cache.invalidate_owner_links(owner_id).await;
        }
    }

    /// Caches an owner's newest links individually and, when the result is
    /// the owner's complete list, as their link list. Returns how many links
    /// were cached.
    pub async fn warmup_user_cache(&self, owner_id: &str) -> usize {
        let limit = self.config.warmup_batch_size;
        let links = match self.repository.list_by_owner(owner_id, Some(limit)).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Failed to warm up cache for {}: {}", owner_id, e);
                return 0;
            }
        };

        for link in &links {
            self.cache.set_link_record(&link.code, link).await;
        }
        if (links.len() as i64) < limit {
            self.cache.set_owner_links(owner_id, &links).await;
        }

        debug!("Warmed up {} links for {}", links.len(), owner_id);
        links.len()
    }
}
