use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{sleep_until, Instant};

use crate::error::RemoteError;

/// Shared throttle for outbound marketplace calls: bounds concurrency and
/// keeps a minimum gap between call starts across all watch tasks.
#[derive(Debug)]
pub struct RequestLimiter {
    permits: Semaphore,
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestLimiter {
    pub fn new(max_concurrent: usize, spacing: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent.max(1)),
            spacing,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for a call slot; the call may proceed while the permit is held.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, RemoteError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RemoteError::Unavailable("request limiter closed".to_string()))?;

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.spacing);
            slot
        };
        sleep_until(slot).await;

        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced() {
        let limiter = RequestLimiter::new(4, Duration::from_millis(500));
        let start = Instant::now();

        for _ in 0..3 {
            let _permit = limiter.acquire().await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let limiter = RequestLimiter::new(1, Duration::ZERO);
        let held = limiter.acquire().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), limiter.acquire())
            .await
            .is_err());
        drop(held);
        assert!(limiter.acquire().await.is_ok());
    }
}
