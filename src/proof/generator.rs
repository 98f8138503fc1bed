// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proof Generation
//!
//! [`ProofGenerator`] pairs a [`ProvingSystem`] with the loaded circuit
//! artifacts. Generation is CPU-bound: [`ProofGenerator::generate_with_deadline`]
//! moves it onto the blocking pool and races it against a timeout and a
//! caller-supplied `CancellationToken`. Whichever fires first cancels the
//! child token the backend polls, so abandoned work stops early.
//!
//! Every failure from the backend surfaces as `ProofGenerationFailed`,
//! except input validation which is reported before the backend runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::artifacts::CircuitArtifacts;
use super::inputs::CircuitInputs;
use super::system::ProvingSystem;
use super::types::Proof;
use crate::zk_error::{ZkError, ZkResult};

/// Maximum distance between the input timestamp and the prover's clock.
pub const MAX_TIMESTAMP_DRIFT_SECS: i64 = 300;

pub struct ProofGenerator {
    system: Arc<dyn ProvingSystem>,
    artifacts: Option<Arc<CircuitArtifacts>>,
}

impl ProofGenerator {
    pub fn new(system: Arc<dyn ProvingSystem>, artifacts: Option<Arc<CircuitArtifacts>>) -> Self {
        Self { system, artifacts }
    }

    /// Loaded artifacts, or `CircuitNotLoaded`.
    pub fn artifacts(&self) -> ZkResult<Arc<CircuitArtifacts>> {
        self.artifacts.clone().ok_or_else(|| {
            ZkError::CircuitNotLoaded("no circuit artifacts configured".to_string())
        })
    }

    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Produce a proof for `inputs` against `artifacts`.
    pub fn generate(&self, inputs: &CircuitInputs, artifacts: &CircuitArtifacts) -> ZkResult<Proof> {
        self.generate_at(inputs, artifacts, Utc::now(), &CancellationToken::new())
    }

    /// [`generate`](Self::generate) with an explicit clock and cancellation.
    pub fn generate_at(
        &self,
        inputs: &CircuitInputs,
        artifacts: &CircuitArtifacts,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ZkResult<Proof> {
        inputs.validate()?;
        let drift = (now.timestamp() - inputs.timestamp).abs();
        if drift > MAX_TIMESTAMP_DRIFT_SECS {
            return Err(ZkError::TimestampExpired {
                drift_secs: drift,
                max_secs: MAX_TIMESTAMP_DRIFT_SECS,
            });
        }

        self.system
            .prove(inputs, artifacts, cancel)
            .map_err(|e| match e {
                ZkError::ProofGenerationFailed(_) => e,
                other => ZkError::generation(other),
            })
    }

    /// Generate on the blocking pool, bounded by `timeout` and `cancel`.
    pub async fn generate_with_deadline(
        self: &Arc<Self>,
        inputs: CircuitInputs,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ZkResult<Proof> {
        let artifacts = self.artifacts()?;
        let generator = Arc::clone(self);
        let child = cancel.child_token();
        let task_token = child.clone();
        let record_id = inputs.record_id;

        let handle = tokio::task::spawn_blocking(move || {
            generator.generate_at(&inputs, &artifacts, Utc::now(), &task_token)
        });

        tokio::select! {
            joined = handle => {
                let proof = joined.map_err(ZkError::generation)??;
                debug!(record_id = %record_id, "Proof generated");
                Ok(proof)
            }
            _ = tokio::time::sleep(timeout) => {
                child.cancel();
                warn!(
                    record_id = %record_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Proof generation timed out"
                );
                Err(ZkError::ProofGenerationFailed(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )))
            }
            _ = cancel.cancelled() => {
                child.cancel();
                Err(ZkError::ProofGenerationFailed("generation cancelled".to_string()))
            }
        }
    }
}
