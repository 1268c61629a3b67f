//! The schedule loop: finds feeds with no pending scrape, asks each feed's
//! plugin when it should next run, and inserts the proposals. Safe to run
//! concurrently with other instances; the store's unique constraint on
//! `(plugin, scheduled_start_at, config)` is the only coordination.
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::registry::PluginRegistry;
use crate::ports::clock::Clock;
use crate::ports::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    registry: Arc<PluginRegistry>,
    clock: Arc<dyn Clock>,
    cfg: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<PluginRegistry>,
        clock: Arc<dyn Clock>,
        cfg: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            cfg,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.cfg.interval);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(inserted) => {
                    consecutive_failures = 0;
                    debug!(inserted, "schedule tick complete");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    let delay = backoff_delay(consecutive_failures);
                    warn!(error = %e, failures = consecutive_failures, ?delay, "schedule tick failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One pass over feeds missing a future scrape. Returns how many
    /// schedules were offered to the store; duplicates are silently skipped
    /// there.
    pub async fn tick(&self) -> Result<usize, StoreError> {
        let requests = self
            .store
            .find_missing_schedules(self.cfg.batch_size)
            .await?;
        let now = self.clock.now_utc();

        let mut inserted = 0;
        for request in requests {
            let Some(plugin) = self.registry.get(&request.plugin) else {
                warn!(
                    feed_id = %request.feed_id,
                    plugin = %request.plugin,
                    "feed references an unregistered plugin"
                );
                continue;
            };

            let schedules = plugin.propose_schedules(&request, now);
            if schedules.is_empty() {
                continue;
            }

            self.store.insert_schedule(&request, &schedules).await?;
            inserted += schedules.len();
        }

        Ok(inserted)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms: u64 = 1_000;
    let max_ms: u64 = 60_000;
    let capped = base_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1).min(10)))
        .min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..capped / 10 + 1);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert!(backoff_delay(1) >= Duration::from_millis(1_000));
        assert!(backoff_delay(1) < backoff_delay(4));
        assert!(backoff_delay(30) <= Duration::from_millis(66_000));
    }
}
