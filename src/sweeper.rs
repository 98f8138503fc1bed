// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Background Sweeper
//!
//! Periodically prunes expired rate-limit windows, sharing tokens and
//! error-history entries so idle state does not grow without bound.
//! Pruning is time-based, never triggered by requests.
//!
//! ## Shutdown
//!
//! Runs until the shared `CancellationToken` is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::resilience::{ErrorHistory, RateLimiter};
use crate::sharing::SharingTokenService;

/// State that can drop its own expired entries.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Remove expired entries, returning how many were dropped.
    fn sweep(&self) -> usize;
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep(&self) -> usize {
        RateLimiter::sweep(self)
    }
}

impl Sweep for SharingTokenService {
    fn name(&self) -> &'static str {
        "sharing_tokens"
    }

    fn sweep(&self) -> usize {
        SharingTokenService::sweep(self)
    }
}

impl Sweep for ErrorHistory {
    fn name(&self) -> &'static str {
        "error_history"
    }

    fn sweep(&self) -> usize {
        self.prune()
    }
}

pub struct Sweeper {
    targets: Vec<Arc<dyn Sweep>>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(targets: Vec<Arc<dyn Sweep>>, interval: Duration) -> Self {
        Self { targets, interval }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            targets = self.targets.len(),
            "Sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Sweeper shutting down");
                    return;
                }
            }
            self.sweep_once();
        }
    }

    /// One pass over every target. Returns the total removed.
    pub fn sweep_once(&self) -> usize {
        let mut total = 0;
        for target in &self.targets {
            let removed = target.sweep();
            if removed > 0 {
                debug!(sweep_target = target.name(), removed, "Swept expired entries");
            }
            total += removed;
        }
        total
    }
}
