//! Sliding-window request limiter for the broker REST API.
//!
//! The broker enforces per-second quotas per endpoint class, so the REST
//! client holds one limiter per class.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// REST endpoint class; each has its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    General,
    Order,
    History,
}

/// Allows at most `max_requests` acquisitions in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    /// Acquisition times inside the current window, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    /// Take a slot now if one is free; otherwise report how long until the
    /// oldest slot expires.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            timestamps.pop_front();
        }
        if timestamps.len() < self.max_requests as usize {
            timestamps.push_back(now);
            return Ok(());
        }
        let oldest = timestamps.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Wait until a slot is available, then take it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    debug!("[fyers-rest] rate limit reached, waiting {wait:?}");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn blocks_once_window_is_full() {
        let limiter = RateLimiter::per_second(3);
        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }
        let wait = limiter.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(limiter.try_acquire().unwrap_err(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_the_oldest_slot() {
        let limiter = RateLimiter::per_second(2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[test]
    fn zero_quota_still_allows_one() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert!(limiter.try_acquire().is_ok());
    }
}
