use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hydrocarbon::api::{self, AppState};
use hydrocarbon::app::registry::PluginRegistry;
use hydrocarbon::app::runner::ScrapeRunner;
use hydrocarbon::app::scheduler::{Scheduler, SchedulerConfig};
use hydrocarbon::app::workers::{WorkerPool, WorkerPoolConfig};
use hydrocarbon::infra::config::AppConfig;
use hydrocarbon::infra::logging::{init_logging, BootError};
use hydrocarbon::infra::postgres_repo::PgStore;
use hydrocarbon::infra::rate_limit::RateLimiter;
use hydrocarbon::infra::reqwest_http::HttpClient;
use hydrocarbon::infra::system_clock::SystemClock;
use hydrocarbon::ports::http::Fetcher;
use hydrocarbon::ports::store::Store;

#[tokio::main]
async fn main() -> Result<(), BootError> {
    let cfg = AppConfig::from_env().map_err(|e| BootError::Fatal(e.to_string()))?;
    init_logging(&cfg.log_level);

    info!(
        listen = %cfg.listen_addr,
        workers = cfg.pool_workers,
        rate_limit = cfg.rate_limit_per_sec,
        "Loaded config"
    );

    let store: Arc<dyn Store> = Arc::new(
        PgStore::connect(&cfg.database_url)
            .await
            .map_err(|e| BootError::Fatal(e.to_string()))?,
    );

    let limiter = Arc::new(RateLimiter::new(
        cfg.rate_limit_per_sec,
        cfg.rate_limit_burst,
    ));
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpClient::new(&cfg.user_agent, limiter).map_err(|e| BootError::Fatal(e.to_string()))?,
    );

    // site plugins are compiled in here
    let registry = Arc::new(
        PluginRegistry::new(Vec::new()).map_err(|e| BootError::Fatal(e.to_string()))?,
    );
    info!(plugins = ?registry.names(), "Plugin registry built");

    let runner = Arc::new(ScrapeRunner::new(
        registry.clone(),
        store.clone(),
        fetcher.clone(),
    ));
    let pool = WorkerPool::new(
        store.clone(),
        runner,
        WorkerPoolConfig {
            workers: cfg.pool_workers,
            batch_size: cfg.claim_batch_size,
            poll_interval: cfg.poll_interval,
        },
    );
    let scheduler = Scheduler::new(
        store.clone(),
        registry.clone(),
        Arc::new(SystemClock),
        SchedulerConfig {
            interval: cfg.scheduler_interval,
            batch_size: cfg.scheduler_batch_size,
        },
    );

    let cancel = CancellationToken::new();
    let pool_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { pool.run(cancel).await }
    });
    let scheduler_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    let state = AppState {
        store,
        registry,
        fetcher,
    };
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .map_err(|e| BootError::Fatal(format!("bind {}: {e}", cfg.listen_addr)))?;
    info!(addr = %cfg.listen_addr, "API listening");

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for shutdown signal");
            }
            info!("shutdown requested");
            cancel.cancel();
        }
    };

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BootError::Fatal(format!("http server error: {e}")))?;

    cancel.cancel();
    let _ = pool_handle.await;
    let _ = scheduler_handle.await;
    info!("shutdown complete");

    Ok(())
}
