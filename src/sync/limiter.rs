//! Remote request limiter: bounded concurrency plus a minimum spacing
//! between requests. Separate from the hashing pool.

use crate::error::ApiError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RemoteRateLimiter {
    semaphore: Arc<Semaphore>,
    /// Earliest instant the next request may start
    next_slot: Arc<Mutex<Option<Instant>>>,
    min_delay: Duration,
    workers: usize,
}

impl RemoteRateLimiter {
    pub fn new(workers: usize, min_delay_ms: u64) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            next_slot: Arc::new(Mutex::new(None)),
            min_delay: Duration::from_millis(min_delay_ms),
            workers,
        }
    }

    /// No spacing, one request at a time per worker.
    pub fn unlimited(workers: usize) -> Self {
        Self::new(workers, 0)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wait for a worker slot and for the spacing delay to elapse.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, ApiError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ApiError::RemoteUnavailable("Request limiter closed".to_string()))?;

        if !self.min_delay.is_zero() {
            // Reserve a start time under the lock, sleep after releasing it.
            let wait = {
                let mut next = self.next_slot.lock();
                let now = Instant::now();
                let start = match *next {
                    Some(slot) if slot > now => slot,
                    _ => now,
                };
                *next = Some(start + self.min_delay);
                start.saturating_duration_since(now)
            };
            if !wait.is_zero() {
                sleep(wait).await;
            }
        }

        Ok(permit)
    }
}
