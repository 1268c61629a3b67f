//! Process-wide per-host token bucket. Handlers acquire through the HTTP
//! client before every outbound request, so a scrape with many workers still
//! respects a host's budget.
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    rate_per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate_per_sec: rate_per_sec.max(f64::MIN_POSITIVE),
            burst: f64::from(burst.max(1)),
        }
    }

    /// Blocks until a token for `host` is available. Returns false when the
    /// token never arrived because the caller was cancelled.
    pub async fn acquire(&self, host: &str, cancel: &CancellationToken) -> bool {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let bucket = buckets.entry(host.to_string()).or_insert(Bucket {
                    tokens: self.burst,
                    refilled_at: now,
                });

                let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
                bucket.refilled_at = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return true;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate_per_sec)
            };

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_immediate() {
        let limiter = RateLimiter::new(1.0, 3);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            assert!(limiter.acquire("example.com", &cancel).await);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn drained_bucket_waits_for_refill() {
        let limiter = RateLimiter::new(10.0, 1);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire("example.com", &cancel).await);

        let start = Instant::now();
        assert!(limiter.acquire("example.com", &cancel).await);
        // one token at 10/s takes ~100ms of (paused, auto-advanced) time
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn hosts_do_not_share_buckets() {
        let limiter = RateLimiter::new(0.001, 1);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire("a.example", &cancel).await);
        assert!(limiter.acquire("b.example", &cancel).await);
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiters() {
        let limiter = RateLimiter::new(0.001, 1);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire("slow.example", &cancel).await);

        cancel.cancel();
        assert!(!limiter.acquire("slow.example", &cancel).await);
    }
}
