//! Sliding-window request accounting per client key.
//!
//! Each client keeps the timestamps of its recent requests. A request is
//! admitted when fewer than `max_requests` of them fall inside the window.
//! Buckets whose newest entry has left the window are dropped by
//! [`SlidingWindowLimiter::prune_idle`], which the maintenance loop calls.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub struct SlidingWindowLimiter {
    max_requests: usize,
    window_ms: u64,
    buckets: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("max_requests", &self.max_requests)
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: window.as_millis() as u64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `key` at `now_ms`.
    ///
    /// On rejection, returns how long until the oldest request in the window
    /// ages out.
    pub fn check(&self, key: &str, now_ms: u64) -> Result<(), Duration> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_default();

        while let Some(&oldest) = bucket.front() {
            if now_ms.saturating_sub(oldest) >= self.window_ms {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() >= self.max_requests {
            let oldest = bucket.front().copied().unwrap_or(now_ms);
            let retry_after = (oldest + self.window_ms).saturating_sub(now_ms);
            return Err(Duration::from_millis(retry_after));
        }

        bucket.push_back(now_ms);
        Ok(())
    }

    pub fn allow(&self, key: &str, now_ms: u64) -> bool {
        self.check(key, now_ms).is_ok()
    }

    /// Drop buckets with no requests inside the window. Returns how many
    /// were removed.
    pub fn prune_idle(&self, now_ms: u64) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket
                .back()
                .is_some_and(|&newest| now_ms.saturating_sub(newest) < self.window_ms)
        });
        before - buckets.len()
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_max_requests_then_reject() {
        let limiter = SlidingWindowLimiter::new(3, WINDOW);

        assert!(limiter.allow("10.0.0.1", 0));
        assert!(limiter.allow("10.0.0.1", 1_000));
        assert!(limiter.allow("10.0.0.1", 2_000));
        // Fourth request within the window is rejected
        assert!(!limiter.allow("10.0.0.1", 3_000));
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, WINDOW);

        assert!(limiter.allow("c", 0));
        assert!(limiter.allow("c", 30_000));
        assert!(!limiter.allow("c", 59_999));
        // First request ages out exactly one window later
        assert!(limiter.allow("c", 60_000));
        assert!(!limiter.allow("c", 60_001));
    }

    #[test]
    fn test_rejected_requests_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);

        assert!(limiter.allow("c", 0));
        for t in 1..10 {
            assert!(!limiter.allow("c", t * 1_000));
        }
        assert!(limiter.allow("c", 60_000));
    }

    #[test]
    fn test_retry_after_hint() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);
        limiter.check("c", 10_000).unwrap();

        let retry = limiter.check("c", 25_000).unwrap_err();
        assert_eq!(retry, Duration::from_secs(45));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);

        assert!(limiter.allow("a", 0));
        assert!(limiter.allow("b", 0));
        assert!(!limiter.allow("a", 1));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_prune_idle() {
        let limiter = SlidingWindowLimiter::new(5, WINDOW);
        limiter.allow("old", 0);
        limiter.allow("fresh", 50_000);

        assert_eq!(limiter.prune_idle(70_000), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.prune_idle(200_000), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
