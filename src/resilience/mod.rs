// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Resilience Layer
//!
//! Wraps every pipeline operation in a small state machine:
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!                    -> Retrying -> Attempting
//!                    -> FallingBack -> Succeeded | Failed
//!                    -> Failed
//! ```
//!
//! Transient infrastructure failures (`NetworkError`,
//! `ContractNotInitialized`) are retried with exponential backoff. When the
//! proof machinery stays unavailable the request is evaluated against the
//! legacy role policy; a grant is returned as [`AccessOutcome::Fallback`]
//! with an advisory, never as a verified result. Every failure lands in the
//! shared [`ErrorHistory`].

pub mod fallback;
pub mod history;
pub mod rate_limit;
pub mod retry;

use std::future::Future;
use std::sync::Arc;

use alloy::primitives::Address;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

pub use fallback::{fallback_access, FallbackDecision, FallbackPolicy};
pub use history::{ErrorContext, ErrorHistory, ErrorStats, Severity};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

use crate::credentials::RecordParties;
use crate::roles::RoleDirectory;
use crate::zk_error::{ZkError, ZkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResilienceState {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay_ms: u64 },
    FallingBack,
    Succeeded,
    Failed,
}

/// How an operation ultimately produced access.
#[derive(Debug, Clone)]
pub enum AccessOutcome<T> {
    /// The operation itself succeeded.
    Verified(T),
    /// Proof machinery was unavailable; legacy policy granted access.
    Fallback(FallbackDecision),
}

/// Outcome plus the states walked to reach it.
#[derive(Debug, Clone)]
pub struct Resolution<T> {
    pub outcome: AccessOutcome<T>,
    pub trail: Vec<ResilienceState>,
}

pub struct ResilienceLayer {
    retry: RetryPolicy,
    fallback: FallbackPolicy,
    roles: RoleDirectory,
    history: Arc<ErrorHistory>,
    rate_limiter: Arc<RateLimiter>,
}

impl ResilienceLayer {
    pub fn new(
        retry: RetryPolicy,
        fallback: FallbackPolicy,
        roles: RoleDirectory,
        history: Arc<ErrorHistory>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            retry,
            fallback,
            roles,
            history,
            rate_limiter,
        }
    }

    pub fn history(&self) -> &Arc<ErrorHistory> {
        &self.history
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Count a verification request against `client`'s window.
    pub fn admit(&self, client: &str) -> ZkResult<()> {
        self.rate_limiter.check(client).inspect_err(|e| {
            self.history.record(ErrorContext::new(
                "admit",
                e,
                0,
                json!({ "client": client }),
            ));
        })
    }

    /// Run `op` with automatic retries only; no fallback evaluation.
    pub async fn retrying<T, F, Fut>(&self, operation: &str, mut op: F) -> ZkResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ZkResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.note_failure(operation, None, &e, attempt);
                    if !self.retry.should_retry(&e, attempt) {
                        return Err(e);
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        kind = %e.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `op` under retry and, when the proof machinery is down, legacy
    /// fallback for `requester`.
    ///
    /// `parties` is only awaited when fallback is evaluated. A fallback
    /// that does not grant access yields the original error.
    pub async fn execute<T, F, Fut, P, PFut>(
        &self,
        operation: &str,
        requester: &Address,
        mut op: F,
        parties: P,
    ) -> ZkResult<Resolution<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ZkResult<T>>,
        P: FnOnce() -> PFut,
        PFut: Future<Output = Option<RecordParties>>,
    {
        let mut trail = vec![ResilienceState::Idle];
        let mut attempt = 1;

        let error = loop {
            trail.push(ResilienceState::Attempting { attempt });
            match op().await {
                Ok(value) => {
                    trail.push(ResilienceState::Succeeded);
                    return Ok(Resolution {
                        outcome: AccessOutcome::Verified(value),
                        trail,
                    });
                }
                Err(e) => {
                    self.note_failure(operation, Some(requester), &e, attempt);
                    if !self.retry.should_retry(&e, attempt) {
                        break e;
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        requester = %requester,
                        attempt,
                        kind = %e.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    trail.push(ResilienceState::Retrying {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if !self.fallback.is_eligible(error.kind()) {
            trail.push(ResilienceState::Failed);
            return Err(error);
        }

        trail.push(ResilienceState::FallingBack);
        let parties = parties().await;
        let decision = fallback_access(requester, parties.as_ref(), &self.roles, error.kind());

        if decision.has_access {
            tracing::warn!(
                operation,
                requester = %requester,
                role = %decision.role,
                cause = %error.kind(),
                "Granted legacy fallback access"
            );
            trail.push(ResilienceState::Succeeded);
            Ok(Resolution {
                outcome: AccessOutcome::Fallback(decision),
                trail,
            })
        } else {
            tracing::info!(
                operation,
                requester = %requester,
                cause = %error.kind(),
                "Legacy fallback refused"
            );
            trail.push(ResilienceState::Failed);
            Err(error)
        }
    }

    fn note_failure(
        &self,
        operation: &str,
        requester: Option<&Address>,
        error: &ZkError,
        attempt: u32,
    ) {
        self.history.record(ErrorContext::new(
            operation,
            error,
            attempt.saturating_sub(1),
            json!({
                "attempt": attempt,
                "requester": requester.map(|r| r.to_string()),
            }),
        ));
    }
}
