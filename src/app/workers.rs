//! The top-level worker pool: claims ready scrapes from the store in
//! batches, runs each one, and reports the terminal state back.
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::runner::ScrapeRunner;
use crate::ports::store::Store;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub batch_size: i64,
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct WorkerPool {
    store: Arc<dyn Store>,
    runner: Arc<ScrapeRunner>,
    cfg: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn Store>, runner: Arc<ScrapeRunner>, cfg: WorkerPoolConfig) -> Self {
        Self { store, runner, cfg }
    }

    /// Runs until the cancellation token fires and every in-flight scrape
    /// has reported its terminal state.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut handles = FuturesUnordered::new();
        for idx in 0..self.cfg.workers.max(1) {
            let store = self.store.clone();
            let runner = self.runner.clone();
            let cfg = self.cfg.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(worker_loop(idx, store, runner, cfg, cancel)));
        }

        while let Some(joined) = handles.next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scrape worker exited abnormally");
            }
        }
    }
}

async fn worker_loop(
    idx: usize,
    store: Arc<dyn Store>,
    runner: Arc<ScrapeRunner>,
    cfg: WorkerPoolConfig,
    cancel: CancellationToken,
) {
    info!(worker = idx, "scrape worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let batch = match store.start_scrapes(cfg.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(worker = idx, error = %e, "claiming scrapes failed");
                if !idle(&cancel, cfg.poll_interval).await {
                    break;
                }
                continue;
            }
        };

        if batch.is_empty() {
            if !idle(&cancel, cfg.poll_interval).await {
                break;
            }
            continue;
        }

        for scrape in batch {
            let outcome = runner.run(&scrape, &cancel).await;
            info!(
                worker = idx,
                scrape_id = %scrape.id,
                plugin = %scrape.plugin,
                state = %outcome.state,
                tasks = outcome.counters.total_tasks,
                datums = outcome.counters.total_datums,
                retries = outcome.counters.total_retries,
                "scrape finished"
            );
            if let Err(e) = store
                .end_scrape(scrape.id, outcome.state, outcome.counters, &outcome.errors)
                .await
            {
                warn!(scrape_id = %scrape.id, error = %e, "recording scrape end failed");
            }
        }
    }
    info!(worker = idx, "scrape worker stopped");
}

/// Sleeps for `d`, returning false when cancelled instead.
async fn idle(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}
