// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proof Verification
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. **Structure**: arity of every proof group. No network I/O happens
//!    before this passes. Failure: `InvalidInput`.
//! 2. **Membership**: the record exists (`NotFound` otherwise) and
//!    `hasAccess(recordId, requester)` holds on the ledger. Failure:
//!    `AccessDenied`.
//! 3. **Binding**: the public signals name the requested record, the
//!    requester's identity commitment and the live Merkle root. Failure:
//!    `ProofVerificationFailed { stage: Binding }`, or `InvalidMerkleProof`
//!    for a stale root.
//! 4. **Cryptographic**: the proof checks out against the verifying key,
//!    and the registry's `verifyAccess` accepts it for the record. Failure: `ProofVerificationFailed { stage: Cryptographic }`.

use alloy::primitives::Address;
use tracing::{debug, info};

use super::field::requester_identity;
use super::types::{Proof, ProofPayload};
use crate::ledger::{EncryptedRecord, LedgerClient};
use crate::models::RecordId;
use crate::zk_error::{VerificationStage, ZkError, ZkResult};

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    pub proof: Proof,
    /// Record as fetched for the binding check, sealed for the requester.
    pub record: EncryptedRecord,
}

#[derive(Clone)]
pub struct ProofVerifier {
    ledger: LedgerClient,
}

impl ProofVerifier {
    pub fn new(ledger: LedgerClient) -> Self {
        Self { ledger }
    }

    /// Pure shape check.
    pub fn verify_structure(payload: &ProofPayload) -> bool {
        payload.has_valid_shape()
    }

    /// `publicSignals[0]` names `expected`.
    pub fn verify_binding(proof: &Proof, expected: RecordId) -> bool {
        proof.is_bound_to(expected)
    }

    /// The verifier contract accepts the proof and the registry accepts it
    /// for `record_id` against the live root.
    pub async fn verify_cryptographic(&self, record_id: RecordId, proof: &Proof) -> ZkResult<bool> {
        if !self.ledger.verify_proof(proof).await? {
            return Ok(false);
        }
        Ok(self.ledger.verify_access(record_id, proof).await?)
    }

    /// Run all four stages.
    pub async fn verify(
        &self,
        payload: &ProofPayload,
        record_id: RecordId,
        requester: Address,
    ) -> ZkResult<VerifiedProof> {
        if !Self::verify_structure(payload) {
            return Err(ZkError::InvalidInput("proof has invalid structure".to_string()));
        }
        let proof = payload.to_proof()?;

        let record = self.ledger.get_encrypted_record(record_id, requester).await?;
        if !record.exists {
            return Err(ZkError::NotFound(format!("record {record_id}")));
        }
        if !self.ledger.has_access(record_id, requester).await? {
            info!(record_id = %record_id, requester = %requester, "Membership check failed");
            return Err(ZkError::AccessDenied(format!(
                "requester is not authorized for record {record_id}"
            )));
        }

        if !Self::verify_binding(&proof, record_id) {
            return Err(proof.binding_error(record_id));
        }
        if proof.public_signals.requester_identity != requester_identity(&requester) {
            return Err(ZkError::rejected(
                VerificationStage::Binding,
                "proof was generated for a different requester",
            ));
        }
        if proof.public_signals.merkle_root != record.merkle_root {
            return Err(ZkError::InvalidMerkleProof(
                "proof was built against a superseded root".to_string(),
            ));
        }

        if !self.verify_cryptographic(record_id, &proof).await? {
            return Err(ZkError::rejected(
                VerificationStage::Cryptographic,
                "proof does not verify against the verifying key",
            ));
        }

        debug!(record_id = %record_id, requester = %requester, "Proof verified");
        Ok(VerifiedProof { proof, record })
    }
}
