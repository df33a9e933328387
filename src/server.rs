//! Service runtime setup.
//!
//! Handles database connections, cache setup, the reconciler lifecycle and
//! graceful shutdown.

use crate::config::{CacheBackend, Config};
use crate::infrastructure::cache::{KvStore, MemoryKv, RedisKv};
use crate::infrastructure::persistence::PgLinkRepository;
use crate::state::AppState;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// Runs the service with the given configuration until a shutdown signal.
///
/// Initializes:
/// - PostgreSQL connection pool
/// - Apply migrations
/// - Redis cache (or in-memory store)
/// - Background reconciler
///
/// # Errors
///
/// Returns an error if:
/// - Database connection fails
/// - Migrations fail
/// - The Redis URL cannot be parsed
pub async fn run(config: Config) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to migrate")?;

    let store: Arc<dyn KvStore> = match config.cache_backend {
        CacheBackend::Redis => {
            // Connects lazily; an unreachable Redis degrades to cache misses.
            let redis = RedisKv::new(&config.redis_url).context("Invalid Redis URL")?;
            tracing::info!("Cache enabled (Redis)");
            Arc::new(redis)
        }
        CacheBackend::Memory => {
            tracing::info!("Cache enabled (in-memory)");
            Arc::new(MemoryKv::new())
        }
    };

    let repository = Arc::new(PgLinkRepository::new(Arc::new(pool.clone())));
    let state = AppState::new(repository, store, &config);

    if !state.link_service.cache().health_check().await {
        tracing::warn!("Cache is unreachable at startup; reads will fall through to the database");
    }

    state.start().await;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let flushed = state.shutdown().await;
    tracing::info!("Flushed {} buffered visits", flushed);

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
