// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Rate Limiting
//!
//! Fixed-window counter per client identity. A client may make
//! `max_requests` verification requests per window; the next one is
//! rejected with `RateLimitExceeded` until the window rolls over. Expired
//! windows are dropped by the background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::zk_error::{ZkError, ZkResult};

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str) -> ZkResult<()> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> ZkResult<()> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(client.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        let elapsed = now.saturating_duration_since(bucket.started);
        if elapsed >= self.window {
            bucket.count = 0;
            bucket.started = now;
        }

        if bucket.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            tracing::warn!(client = %client, retry_after_secs = retry_after, "Rate limit exceeded");
            return Err(ZkError::RateLimitExceeded {
                retry_after_secs: retry_after,
            });
        }
        bucket.count += 1;
        Ok(())
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - buckets.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_request_over_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at("client", now).unwrap();
        }
        let err = limiter.check_at("client", now).unwrap_err();
        assert!(matches!(err, ZkError::RateLimitExceeded { retry_after_secs } if retry_after_secs > 0));
    }

    #[test]
    fn accepts_again_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("client", now).unwrap();
        assert!(limiter.check_at("client", now).is_err());
        assert!(limiter.check_at("client", now + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("a", now).unwrap();
        assert!(limiter.check_at("b", now).is_ok());
    }

    #[test]
    fn sweep_drops_expired_windows() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        limiter.check_at("a", now).unwrap();
        limiter.check_at("b", now + Duration::from_secs(30)).unwrap();
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(61)), 1);
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(61)), 0);
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(91)), 1);
    }
}
