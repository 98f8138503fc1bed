// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded history of pipeline failures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::zk_error::{ZkError, ZkErrorKind};

const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_MAX_AGE_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn for_kind(kind: ZkErrorKind) -> Self {
        match kind {
            ZkErrorKind::ContractNotInitialized | ZkErrorKind::CircuitNotLoaded => {
                Severity::Critical
            }
            ZkErrorKind::EncryptionFailed
            | ZkErrorKind::DecryptionFailed
            | ZkErrorKind::ProofVerificationFailed
            | ZkErrorKind::InvalidMerkleProof => Severity::High,
            ZkErrorKind::NetworkError
            | ZkErrorKind::ProofGenerationFailed
            | ZkErrorKind::AccessDenied
            | ZkErrorKind::TimestampExpired
            | ZkErrorKind::InvalidAccessKey => Severity::Medium,
            ZkErrorKind::RateLimitExceeded
            | ZkErrorKind::InvalidInput
            | ZkErrorKind::CredentialNotFound
            | ZkErrorKind::NotFound => Severity::Low,
        }
    }
}

/// One recorded failure.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorContext {
    pub kind: ZkErrorKind,
    pub operation: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub severity: Severity,
    /// Auxiliary state at failure time (record id, attempt, and so on).
    #[schema(value_type = Object)]
    pub snapshot: serde_json::Value,
}

impl ErrorContext {
    pub fn new(
        operation: &str,
        error: &ZkError,
        retry_count: u32,
        snapshot: serde_json::Value,
    ) -> Self {
        let kind = error.kind();
        Self {
            kind,
            operation: operation.to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
            retry_count,
            severity: Severity::for_kind(kind),
            snapshot,
        }
    }
}

/// Aggregate counts for health reporting.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ErrorStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

/// Ring buffer of recent failures, pruned by count and age.
pub struct ErrorHistory {
    entries: Mutex<VecDeque<ErrorContext>>,
    capacity: usize,
    max_age: Duration,
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::seconds(DEFAULT_MAX_AGE_SECS))
    }
}

impl ErrorHistory {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            max_age,
        }
    }

    pub fn record(&self, context: ErrorContext) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(context);
    }

    /// Drop entries older than the maximum age. Returns how many were removed.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| now - e.timestamp <= self.max_age);
        before - entries.len()
    }

    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ErrorContext> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ErrorStats {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stats = ErrorStats {
            total: entries.len(),
            ..ErrorStats::default()
        };
        for e in entries.iter() {
            *stats.by_kind.entry(e.kind.code().to_string()).or_default() += 1;
            let severity = serde_json::to_value(e.severity)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *stats.by_severity.entry(severity).or_default() += 1;
        }
        stats
    }
}
