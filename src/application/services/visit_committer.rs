//! Write-behind committer for visit batches.
//!
//! Visits are buffered per short code and written to the durable store after
//! a debounce window. At most one worker task exists per code, so commits for
//! the same code do not overlap (shutdown flushing aside) and each commit
//! writes exactly the visits in its batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, warn};

use crate::domain::entities::Visit;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::cache::LinkCache;

/// Timing and retry settings for deferred commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitterConfig {
    /// Delay between the first buffered visit and its commit.
    pub debounce: Duration,
    /// Attempts per commit before the batch is parked for the reconciler.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
struct PendingBatch {
    link_id: i64,
    visits: Vec<Visit>,
    /// A worker task currently owns this batch.
    worker_active: bool,
    /// Distinguishes a batch from one recreated under the same code after a discard.
    generation: u64,
}

#[derive(Debug)]
enum CommitOutcome {
    Committed,
    LinkGone,
    Failed,
}

/// Buffers visits per code and commits them to the durable store.
///
/// After a successful commit the code's visit counter is cleared and its
/// cached record invalidated. A batch whose commit keeps failing is put back
/// (visits first, in order) and parked until [`VisitCommitter::flush_pending`]
/// hands it to a new worker.
pub struct VisitCommitter<L: LinkRepository> {
    repository: Arc<L>,
    cache: Arc<LinkCache>,
    config: CommitterConfig,
    pending: DashMap<String, PendingBatch>,
    next_generation: AtomicU64,
}

impl<L: LinkRepository> VisitCommitter<L> {
    pub fn new(repository: Arc<L>, cache: Arc<LinkCache>, config: CommitterConfig) -> Self {
        Self {
            repository,
            cache,
            config,
            pending: DashMap::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> CommitterConfig {
        self.config
    }

    /// Adds a visit to the code's pending batch, starting a worker if none owns it.
    ///
    /// Never waits on the durable store.
    pub fn enqueue(self: &Arc<Self>, code: &str, link_id: i64, visit: Visit) {
        let spawn_generation = {
            let mut batch = self
                .pending
                .entry(code.to_string())
                .or_insert_with(|| PendingBatch {
                    link_id,
                    visits: Vec::new(),
                    worker_active: false,
                    generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                });
            batch.visits.push(visit);

            if batch.worker_active {
                None
            } else {
                batch.worker_active = true;
                Some(batch.generation)
            }
        };

        if let Some(generation) = spawn_generation {
            self.spawn_worker(code.to_string(), generation);
        }
    }

    /// Restarts workers for parked batches. Returns how many were restarted.
    pub fn flush_pending(self: &Arc<Self>) -> usize {
        let mut parked = Vec::new();
        for mut batch in self.pending.iter_mut() {
            if !batch.worker_active && !batch.visits.is_empty() {
                batch.worker_active = true;
                parked.push((batch.key().clone(), batch.generation));
            }
        }

        let count = parked.len();
        for (code, generation) in parked {
            debug!("Restarting commit worker for {}", code);
            self.spawn_worker(code, generation);
        }
        count
    }

    /// Commits every buffered visit immediately, without waiting for the
    /// debounce window. Returns the number of visits written.
    ///
    /// Intended for shutdown. Workers that are still sleeping find their
    /// batch empty afterwards and exit.
    pub async fn flush_all(&self) -> usize {
        let codes: Vec<String> = self.pending.iter().map(|b| b.key().clone()).collect();
        let mut written = 0;

        for code in codes {
            let taken = self.pending.get_mut(&code).map(|mut batch| {
                (
                    batch.link_id,
                    batch.generation,
                    std::mem::take(&mut batch.visits),
                )
            });
            let Some((link_id, generation, visits)) = taken else {
                continue;
            };
            if visits.is_empty() {
                continue;
            }

            match self.commit(&code, link_id, &visits).await {
                CommitOutcome::Committed => written += visits.len(),
                CommitOutcome::LinkGone => self.forget(&code, generation),
                CommitOutcome::Failed => self.requeue(&code, generation, visits, false),
            }
        }

        written
    }

    /// Drops the pending batch for `code`. Returns how many visits were dropped.
    pub fn discard(&self, code: &str) -> usize {
        self.pending
            .remove(code)
            .map(|(_, batch)| batch.visits.len())
            .unwrap_or(0)
    }

    fn forget(&self, code: &str, generation: u64) {
        self.pending.remove_if(code, |_, b| b.generation == generation);
    }

    /// Number of visits buffered for `code`.
    pub fn pending_visits(&self, code: &str) -> usize {
        self.pending.get(code).map(|b| b.visits.len()).unwrap_or(0)
    }

    /// Codes with a batch in the buffer, including batches being committed.
    pub fn pending_codes(&self) -> Vec<String> {
        self.pending.iter().map(|b| b.key().clone()).collect()
    }

    /// True when no batch is buffered and no worker is running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    fn spawn_worker(self: &Arc<Self>, code: String, generation: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_worker(code, generation).await });
    }

    async fn run_worker(&self, code: String, generation: u64) {
        loop {
            tokio::time::sleep(self.config.debounce).await;

            let Some((link_id, visits)) = self.take_batch(&code, generation) else {
                debug!("Commit worker for {} finished", code);
                return;
            };

            match self.commit(&code, link_id, &visits).await {
                CommitOutcome::Committed => {}
                CommitOutcome::LinkGone => {
                    self.forget(&code, generation);
                    return;
                }
                CommitOutcome::Failed => {
                    self.requeue(&code, generation, visits, true);
                    return;
                }
            }
        }
    }

    /// Takes the visits of the worker's batch.
    ///
    /// Returns `None` (and removes the entry) once the batch is empty, or if
    /// the entry now belongs to another generation.
    fn take_batch(&self, code: &str, generation: u64) -> Option<(i64, Vec<Visit>)> {
        if self
            .pending
            .remove_if(code, |_, b| b.generation == generation && b.visits.is_empty())
            .is_some()
        {
            return None;
        }

        let mut batch = self.pending.get_mut(code)?;
        if batch.generation != generation {
            return None;
        }
        Some((batch.link_id, std::mem::take(&mut batch.visits)))
    }

    /// Puts failed visits back in front of anything buffered since.
    fn requeue(&self, code: &str, generation: u64, mut failed: Vec<Visit>, park: bool) {
        match self.pending.get_mut(code) {
            Some(mut batch) if batch.generation == generation => {
                failed.append(&mut batch.visits);
                batch.visits = failed;
                if park {
                    batch.worker_active = false;
                }
                warn!(
                    "Parked {} visits for {} until the next reconcile pass",
                    batch.visits.len(),
                    code
                );
            }
            _ => warn!(
                "Dropping {} visits for {}: batch was discarded",
                failed.len(),
                code
            ),
        }
    }

    async fn commit(&self, code: &str, link_id: i64, visits: &[Visit]) -> CommitOutcome {
        let backoff_ms = (self.config.retry_backoff.as_millis() as u64).max(2);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(backoff_ms / 2)
            .take(self.config.max_attempts.saturating_sub(1));

        let result = Retry::spawn(strategy, || {
            self.repository.commit_visits(link_id, visits)
        })
        .await;

        match result {
            Ok(true) => {
                self.cache.clear_visit_counter(code).await;
                self.cache.invalidate_link_record(code).await;
                metrics::counter!("visit_commits_total", "result" => "ok").increment(1);
                info!("Committed {} visits for {}", visits.len(), code);
                CommitOutcome::Committed
            }
            Ok(false) => {
                self.cache.clear_visit_counter(code).await;
                metrics::counter!("visit_commits_total", "result" => "gone").increment(1);
                warn!(
                    "Link {} ({}) no longer exists; dropping {} visits",
                    code,
                    link_id,
                    visits.len()
                );
                CommitOutcome::LinkGone
            }
            Err(e) => {
                metrics::counter!("visit_commits_total", "result" => "error").increment(1);
                error!(
                    "Failed to commit {} visits for {} after {} attempts: {} ({})",
                    visits.len(),
                    code,
                    self.config.max_attempts,
                    e,
                    e.code()
                );
                CommitOutcome::Failed
            }
        }
    }
}
