//! Executes one claimed scrape: seeds the task queue from the config's
//! entrypoints, fans tasks out to the plugin's handlers under its declared
//! concurrency, retries transient failures, and forwards facts to the store
//! before a task is considered complete.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::plugin::{HandlerOpts, Plugin, Task};
use crate::app::queue::TaskQueue;
use crate::app::registry::PluginRegistry;
use crate::domain::model::{FailureKind, Scrape, ScrapeCounters, ScrapeState};
use crate::ports::http::Fetcher;
use crate::ports::store::{Store, StoreError};

/// Per-scrape resource bounds.
#[derive(Debug, Clone, Copy)]
pub struct RunnerLimits {
    /// Times a single task may be requeued after a transient failure.
    pub max_task_retries: u32,
    /// Tasks a scrape may enqueue over its lifetime.
    pub max_tasks: usize,
    /// Errors recorded on the scrape; the rest are counted and dropped.
    pub max_errors: usize,
    /// Ceiling for server-requested retry delays.
    pub max_rate_limit_delay: Duration,
}

impl Default for RunnerLimits {
    fn default() -> Self {
        Self {
            max_task_retries: 3,
            max_tasks: 10_000,
            max_errors: 50,
            max_rate_limit_delay: Duration::from_secs(30),
        }
    }
}

/// Terminal report for one scrape run.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: ScrapeState,
    pub counters: ScrapeCounters,
    pub errors: Vec<String>,
}

#[derive(Default)]
struct RunState {
    counters: ScrapeCounters,
    errors: Vec<String>,
    dropped_errors: u64,
}

pub struct ScrapeRunner {
    registry: Arc<PluginRegistry>,
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    limits: RunnerLimits,
}

impl ScrapeRunner {
    pub fn new(
        registry: Arc<PluginRegistry>,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            registry,
            store,
            fetcher,
            limits: RunnerLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunnerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn run(&self, scrape: &Scrape, cancel: &CancellationToken) -> RunOutcome {
        let Some(plugin) = self.registry.get(&scrape.plugin) else {
            return RunOutcome {
                state: ScrapeState::Errored,
                counters: ScrapeCounters::default(),
                errors: vec![format!("no plugin registered under {:?}", scrape.plugin)],
            };
        };

        let queue = TaskQueue::new(self.limits.max_tasks);
        let shared = Mutex::new(RunState::default());

        for url in &scrape.config.entrypoints {
            if let Err(e) = queue.push(Task::new(url.clone())).await {
                self.record_error(&shared, e.to_string()).await;
                queue.close().await;
                break;
            }
        }

        let workers = plugin.max_concurrency().max(1);
        debug!(
            scrape_id = %scrape.id,
            plugin = %scrape.plugin,
            workers,
            entrypoints = scrape.config.entrypoints.len(),
            "scrape starting"
        );

        futures::future::join_all(
            (0..workers).map(|_| self.worker(plugin.as_ref(), scrape, &queue, cancel, &shared)),
        )
        .await;

        let mut state = shared.into_inner();
        if cancel.is_cancelled() {
            state.errors.push("scrape cancelled".to_string());
        }
        if state.dropped_errors > 0 {
            warn!(
                scrape_id = %scrape.id,
                dropped = state.dropped_errors,
                "error list capped, further errors were only counted"
            );
        }

        let final_state = if state.errors.is_empty() {
            ScrapeState::Success
        } else {
            ScrapeState::Errored
        };

        RunOutcome {
            state: final_state,
            counters: state.counters,
            errors: state.errors,
        }
    }

    async fn worker(
        &self,
        plugin: &dyn Plugin,
        scrape: &Scrape,
        queue: &TaskQueue,
        cancel: &CancellationToken,
        shared: &Mutex<RunState>,
    ) {
        loop {
            let task = tokio::select! {
                _ = cancel.cancelled() => break,
                task = queue.pop() => match task {
                    Some(t) => t,
                    None => break,
                },
            };

            shared.lock().await.counters.total_tasks += 1;
            self.run_task(plugin, scrape, queue, cancel, shared, task)
                .await;
            queue.task_done().await;
        }
    }

    async fn run_task(
        &self,
        plugin: &dyn Plugin,
        scrape: &Scrape,
        queue: &TaskQueue,
        cancel: &CancellationToken,
        shared: &Mutex<RunState>,
        mut task: Task,
    ) {
        let Some((handler, route_params)) = PluginRegistry::dispatch(plugin, &task.url) else {
            // unroutable URLs never retry
            self.record_error(shared, format!("no route matches {}", task.url))
                .await;
            return;
        };

        let opts = HandlerOpts {
            client: self.fetcher.clone(),
            route_params,
        };

        let response = match (handler)(cancel.clone(), opts, task.clone()).await {
            Ok(response) => response,
            Err(err) => {
                match err.kind() {
                    FailureKind::RateLimited => {
                        let delay = Duration::from_secs(err.retry_after().unwrap_or(1))
                            .min(self.limits.max_rate_limit_delay);
                        debug!(url = %task.url, ?delay, "rate limited, requeueing");
                        shared.lock().await.counters.total_retries += 1;
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(delay) => queue.requeue(task).await,
                        }
                    }
                    FailureKind::Transient => {
                        if task.retries < self.limits.max_task_retries {
                            task.retries += 1;
                            let mut s = shared.lock().await;
                            s.counters.total_retries += 1;
                            drop(s);
                            debug!(url = %task.url, attempt = task.retries, error = %err, "task retrying");
                            queue.requeue(task).await;
                        } else {
                            self.record_error(
                                shared,
                                format!("task {} exhausted retries: {err}", task.url),
                            )
                            .await;
                        }
                    }
                    FailureKind::Permanent => {
                        self.record_error(shared, format!("task {} failed: {err}", task.url))
                            .await;
                    }
                    FailureKind::Cancelled => {
                        // the runner records cancellation once, at the end
                    }
                }
                return;
            }
        };

        for fact in &response.facts {
            match self.store.write_fact(scrape.id, fact).await {
                Ok(()) => shared.lock().await.counters.total_datums += 1,
                Err(StoreError::UnsupportedFact) => {
                    self.record_error(
                        shared,
                        format!("handler for {} emitted an unsupported fact", task.url),
                    )
                    .await;
                }
                Err(err) => {
                    // the store is unreachable; nothing else will get through
                    self.record_error(shared, format!("fact write failed: {err}"))
                        .await;
                    queue.close().await;
                    return;
                }
            }
        }

        for child in response.tasks {
            if let Err(e) = queue.push(child).await {
                self.record_error(shared, e.to_string()).await;
                queue.close().await;
                return;
            }
        }
    }

    async fn record_error(&self, shared: &Mutex<RunState>, message: String) {
        let mut s = shared.lock().await;
        if s.errors.len() < self.limits.max_errors {
            s.errors.push(message);
        } else {
            s.dropped_errors += 1;
        }
    }
}
