// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Proof representations.
//!
//! [`ProofPayload`] is the JSON wire form submitted by clients. It is only
//! shape-checked on arrival; [`ProofPayload::to_proof`] converts it into the
//! typed [`Proof`] once the shape is known to be right.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::field::parse_field_element;
use crate::models::RecordId;
use crate::zk_error::{VerificationStage, ZkError, ZkResult};

/// Number of public signals exposed by the circuit.
pub const PUBLIC_SIGNAL_COUNT: usize = 3;

/// Submitted proof, exactly as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProofPayload {
    #[serde(rename = "pA", default)]
    pub p_a: Vec<String>,
    #[serde(rename = "pB", default)]
    pub p_b: Vec<Vec<String>>,
    #[serde(rename = "pC", default)]
    pub p_c: Vec<String>,
    /// `[recordId, requesterIdentity, merkleRoot]`
    #[serde(rename = "publicSignals", default)]
    pub public_signals: Vec<String>,
}

impl ProofPayload {
    /// Arity check only; element values are not inspected.
    pub fn has_valid_shape(&self) -> bool {
        self.p_a.len() == 2
            && self.p_b.len() == 2
            && self.p_b.iter().all(|row| row.len() == 2)
            && self.p_c.len() == 2
            && self.public_signals.len() == PUBLIC_SIGNAL_COUNT
    }

    /// Parse into a typed proof. Fails with `InvalidInput` on shape errors
    /// or elements that are not canonical field elements.
    pub fn to_proof(&self) -> ZkResult<Proof> {
        if !self.has_valid_shape() {
            return Err(ZkError::InvalidInput("proof has invalid structure".to_string()));
        }
        let num = |field: &str, value: &str| {
            parse_field_element(value).ok_or_else(|| {
                ZkError::InvalidInput(format!("proof field {field} is not a field element"))
            })
        };
        Ok(Proof {
            a: [num("pA", &self.p_a[0])?, num("pA", &self.p_a[1])?],
            b: [
                [num("pB", &self.p_b[0][0])?, num("pB", &self.p_b[0][1])?],
                [num("pB", &self.p_b[1][0])?, num("pB", &self.p_b[1][1])?],
            ],
            c: [num("pC", &self.p_c[0])?, num("pC", &self.p_c[1])?],
            public_signals: PublicSignals {
                record_id: num("publicSignals", &self.public_signals[0])?,
                requester_identity: num("publicSignals", &self.public_signals[1])?,
                merkle_root: num("publicSignals", &self.public_signals[2])?,
            },
        })
    }
}

/// Public outputs of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSignals {
    pub record_id: U256,
    pub requester_identity: U256,
    pub merkle_root: U256,
}

impl PublicSignals {
    pub fn to_array(&self) -> [U256; PUBLIC_SIGNAL_COUNT] {
        [self.record_id, self.requester_identity, self.merkle_root]
    }
}

/// Typed proof: three curve-point groups plus public signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
    pub public_signals: PublicSignals,
}

impl Proof {
    pub fn to_payload(&self) -> ProofPayload {
        let s = |v: &U256| v.to_string();
        ProofPayload {
            p_a: self.a.iter().map(s).collect(),
            p_b: self.b.iter().map(|row| row.iter().map(s).collect()).collect(),
            p_c: self.c.iter().map(s).collect(),
            public_signals: self.public_signals.to_array().iter().map(s).collect(),
        }
    }

    /// Whether the proof claims to be about `record_id`.
    pub fn is_bound_to(&self, record_id: RecordId) -> bool {
        self.public_signals.record_id == record_id.as_u256()
    }

    /// Error for a proof bound to a different record.
    pub fn binding_error(&self, expected: RecordId) -> ZkError {
        ZkError::rejected(
            VerificationStage::Binding,
            format!(
                "proof is bound to record {} but record {expected} was requested",
                self.public_signals.record_id
            ),
        )
    }
}
