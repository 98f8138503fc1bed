// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Circuit input assembly.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};

use super::field::FIELD_MODULUS;
use crate::credentials::{CredentialStore, TREE_DEPTH};
use crate::models::{AccessKey, RecordId};
use crate::zk_error::{ZkError, ZkResult};

/// Full input vector for one proof. Built fresh per request, never stored.
#[derive(Debug, Clone)]
pub struct CircuitInputs {
    pub requester: Address,
    pub record_id: RecordId,
    pub access_key: AccessKey,
    /// Unix seconds at build time.
    pub timestamp: i64,
    pub path_elements: Vec<U256>,
    pub path_indices: Vec<u8>,
    pub record_commitment: U256,
    pub merkle_root: U256,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ZkError {
    ZkError::InvalidCircuitInput {
        field,
        reason: reason.into(),
    }
}

impl CircuitInputs {
    /// Check every field before the proving system sees it.
    pub fn validate(&self) -> ZkResult<()> {
        if self.requester == Address::ZERO {
            return Err(invalid("requesterAddr", "must not be the zero address"));
        }
        if self.access_key.is_zero() {
            return Err(invalid("accessKey", "must not be empty"));
        }
        if self.timestamp <= 0 {
            return Err(invalid("timestamp", "must be a positive unix time"));
        }
        if self.path_elements.len() != TREE_DEPTH {
            return Err(invalid(
                "pathElements",
                format!("expected {TREE_DEPTH} elements, got {}", self.path_elements.len()),
            ));
        }
        if self.path_elements.iter().any(|e| *e >= FIELD_MODULUS) {
            return Err(invalid("pathElements", "element outside the scalar field"));
        }
        if self.path_indices.len() != TREE_DEPTH {
            return Err(invalid(
                "pathIndices",
                format!("expected {TREE_DEPTH} indices, got {}", self.path_indices.len()),
            ));
        }
        if let Some(bad) = self.path_indices.iter().find(|i| **i > 1) {
            return Err(invalid("pathIndices", format!("value {bad} not in {{0,1}}")));
        }
        if self.record_commitment.is_zero() {
            return Err(invalid("recordCommitment", "must not be empty"));
        }
        if self.merkle_root.is_zero() {
            return Err(invalid("merkleRoot", "must not be empty"));
        }
        Ok(())
    }
}

/// Builds [`CircuitInputs`] from the credential store.
#[derive(Clone)]
pub struct ProofInputBuilder {
    store: Arc<CredentialStore>,
}

impl ProofInputBuilder {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    pub fn build(
        &self,
        requester: Address,
        record_id: RecordId,
        access_key: AccessKey,
    ) -> ZkResult<CircuitInputs> {
        self.build_at(requester, record_id, access_key, Utc::now())
    }

    /// Same as [`build`](Self::build) with an explicit clock.
    pub fn build_at(
        &self,
        requester: Address,
        record_id: RecordId,
        access_key: AccessKey,
        now: DateTime<Utc>,
    ) -> ZkResult<CircuitInputs> {
        if access_key.is_zero() {
            return Err(invalid("accessKey", "must not be empty"));
        }
        let commitment = self
            .store
            .generate_merkle_proof(&access_key, record_id, &requester)?;
        let record_commitment = self
            .store
            .record_commitment(record_id)
            .ok_or_else(|| ZkError::NotFound(format!("record {record_id}")))?;

        let inputs = CircuitInputs {
            requester,
            record_id,
            access_key,
            timestamp: now.timestamp(),
            path_elements: commitment.path_elements,
            path_indices: commitment.path_indices,
            record_commitment,
            merkle_root: commitment.root,
        };
        inputs.validate()?;

        tracing::debug!(
            record_id = %record_id,
            requester = %requester,
            leaf_index = commitment.leaf_index,
            "Circuit inputs assembled"
        );
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn built() -> (ProofInputBuilder, CircuitInputs) {
        let store = Arc::new(CredentialStore::new(b"inputs".to_vec()));
        let record = RecordId::new(3);
        let (key, _) = store.register_record(record, addr(1), addr(2)).unwrap();
        let builder = ProofInputBuilder::new(store);
        let inputs = builder.build(addr(1), record, key).unwrap();
        (builder, inputs)
    }

    fn field_of(err: ZkError) -> &'static str {
        match err {
            ZkError::InvalidCircuitInput { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn builds_complete_inputs() {
        let (_, inputs) = built();
        assert_eq!(inputs.path_elements.len(), TREE_DEPTH);
        assert_eq!(inputs.path_indices.len(), TREE_DEPTH);
        assert!(inputs.timestamp > 0);
        assert!(!inputs.merkle_root.is_zero());
    }

    #[test]
    fn unknown_requester_has_no_credential() {
        let (builder, inputs) = built();
        let err = builder
            .build(addr(9), inputs.record_id, inputs.access_key)
            .unwrap_err();
        assert!(matches!(err, ZkError::CredentialNotFound { .. }));
    }

    #[test]
    fn path_is_released_only_for_the_issued_key() {
        let (builder, inputs) = built();
        let err = builder
            .build(addr(1), inputs.record_id, AccessKey::from_bytes([5u8; 32]))
            .unwrap_err();
        assert!(matches!(err, ZkError::InvalidAccessKey(_)));

        let err = builder
            .build(addr(1), inputs.record_id, AccessKey::from_bytes([0u8; 32]))
            .unwrap_err();
        assert_eq!(field_of(err), "accessKey");
    }

    #[test]
    fn short_path_names_the_field() {
        let (_, mut inputs) = built();
        inputs.path_elements.pop();
        assert_eq!(field_of(inputs.validate().unwrap_err()), "pathElements");
    }

    #[test]
    fn non_binary_index_names_the_field() {
        let (_, mut inputs) = built();
        inputs.path_indices[4] = 2;
        assert_eq!(field_of(inputs.validate().unwrap_err()), "pathIndices");
    }

    #[test]
    fn empty_key_and_root_are_rejected() {
        let (_, inputs) = built();

        let mut no_key = inputs.clone();
        no_key.access_key = AccessKey::from_bytes([0u8; 32]);
        assert_eq!(field_of(no_key.validate().unwrap_err()), "accessKey");

        let mut no_root = inputs;
        no_root.merkle_root = U256::ZERO;
        assert_eq!(field_of(no_root.validate().unwrap_err()), "merkleRoot");
    }
}
