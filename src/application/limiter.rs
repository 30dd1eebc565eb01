//! # Invoke Limiter
//!
//! Global permit pool bounding the number of simultaneously in-flight
//! provider calls, independent of which user or capability issued them.
//! Acquisition suspends the caller until a permit frees up; callers that
//! need bounded waiting layer a deadline on top with `tokio::time::timeout`.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::config::LimitsConfig;

/// A held permit. Dropping it returns the slot to the pool.
pub struct InvokePermit {
    _inner: OwnedSemaphorePermit,
}

#[derive(Clone)]
pub struct InvokeLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl InvokeLimiter {
    pub fn new(capacity: usize) -> Self {
        // A zero-capacity pool would deadlock every request.
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn from_config(config: &LimitsConfig) -> Self {
        Self::new(config.concurrent_requests)
    }

    /// Wait for a free slot. Waiters are served in acquisition order.
    pub async fn acquire(&self) -> InvokePermit {
        // The semaphore is never closed, so acquisition cannot fail.
        let inner = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("invoke limiter semaphore closed");
        InvokePermit { _inner: inner }
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let limiter = InvokeLimiter::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let limiter = InvokeLimiter::new(1);
        let permit = limiter.acquire().await;
        assert_eq!(limiter.available(), 0);
        drop(permit);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_deadline_layers_on_top() {
        let limiter = InvokeLimiter::new(1);
        let _held = limiter.acquire().await;

        let waited =
            tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let limiter = InvokeLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
    }
}
