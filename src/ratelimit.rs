use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_millis(1000);

/// Per-source sliding-window admission control.
///
/// Cloning shares state, so one handle per external source name can be
/// passed to every component that calls out to that source. Waiters on the
/// same source serialize on its window mutex; distinct sources never block
/// each other.
#[derive(Clone, Default)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Arc<Mutex<Vec<Instant>>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend the caller just long enough that no more than
    /// `limit_per_second` calls to `source` land within any trailing
    /// 1000 ms window, then record this call. A zero limit disables
    /// admission control for the source.
    pub async fn wait_if_needed(&self, source: &str, limit_per_second: usize) {
        if limit_per_second == 0 {
            return;
        }

        let window = self
            .windows
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();

        let mut stamps = window.lock().await;
        let now = Instant::now();
        stamps.retain(|t| now.duration_since(*t) < WINDOW);

        if stamps.len() >= limit_per_second {
            // Oldest remaining stamp frees the next slot.
            let oldest = stamps[0];
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            sleep(wait).await;
            let now = Instant::now();
            stamps.retain(|t| now.duration_since(*t) < WINDOW);
        }

        stamps.push(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn over_limit_call_waits_for_a_slot() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.wait_if_needed("registry", 2).await;
        limiter.wait_if_needed("registry", 2).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Third call inside the same second must wait until the first
        // stamp ages out.
        limiter.wait_if_needed("registry", 2).await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_calls_never_wait() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            let before = Instant::now();
            limiter.wait_if_needed("registry", 1).await;
            assert_eq!(before.elapsed(), Duration::ZERO);
            sleep(Duration::from_millis(1100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_independent() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.wait_if_needed("registry", 1).await;
        limiter.wait_if_needed("pubmed", 1).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
