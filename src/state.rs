use std::sync::Arc;

use crate::application::services::{LinkService, Reconciler};
use crate::config::Config;
use crate::domain::repositories::LinkRepository;
use crate::infrastructure::cache::{KvStore, LinkCache};

/// Wired application components.
///
/// The service and its reconciler share one repository, one cache and one
/// visit committer.
pub struct AppState<L: LinkRepository> {
    pub link_service: Arc<LinkService<L>>,
    pub reconciler: Arc<Reconciler<L>>,
}

impl<L: LinkRepository> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            link_service: Arc::clone(&self.link_service),
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl<L: LinkRepository> AppState<L> {
    pub fn new(repository: Arc<L>, store: Arc<dyn KvStore>, config: &Config) -> Self {
        let cache = Arc::new(LinkCache::new(store, config.cache_ttls()));
        let link_service = Arc::new(LinkService::new(
            repository,
            cache,
            config.committer_config(),
        ));
        let reconciler = Arc::new(Reconciler::for_service(
            &link_service,
            config.reconciler_config(),
        ));

        Self {
            link_service,
            reconciler,
        }
    }

    /// Starts background work.
    pub async fn start(&self) {
        self.reconciler.start().await;
    }

    /// Stops the reconciler and flushes every buffered visit.
    ///
    /// Returns the number of visits committed during the final flush.
    pub async fn shutdown(&self) -> usize {
        self.reconciler.stop().await;
        self.link_service.shutdown().await
    }
}
