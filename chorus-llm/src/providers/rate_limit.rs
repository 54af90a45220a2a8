//! Client-side request throttling shared by the provider clients.

use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

use super::request_failed;
use chorus_core::ChorusResult;

/// Bounds concurrent requests and spaces their start times.
///
/// With `requests_per_minute = n` at most `n` requests are in flight and
/// consecutive requests start at least `60s / n` apart (but never less than
/// 10ms).
#[derive(Debug)]
pub struct RateLimiter {
    provider: &'static str,
    permits: Semaphore,
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(provider: &'static str, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        let min_interval_ms = (60_000 / rpm as u64).max(10);
        Self {
            provider,
            permits: Semaphore::new(rpm as usize),
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for a slot. The permit is held for the duration of the request.
    pub async fn acquire(&self) -> ChorusResult<SemaphorePermit<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| request_failed(self.provider, 0, format!("Rate limiter error: {}", e)))?;

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(
                    provider = self.provider,
                    wait_ms = wait.as_millis() as u64,
                    "throttling LLM request"
                );
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_rpm() {
        assert_eq!(RateLimiter::new("test", 60).min_interval(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new("test", 0).min_interval(), Duration::from_secs(60));
        assert_eq!(
            RateLimiter::new("test", 100_000).min_interval(),
            Duration::from_millis(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_are_spaced() {
        let limiter = RateLimiter::new("test", 60);
        let start = Instant::now();

        drop(limiter.acquire().await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(1));

        drop(limiter.acquire().await.unwrap());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
