// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Proving system backends.
//!
//! [`ProvingSystem`] is the seam between the pipeline and whatever produces
//! and checks proofs. Implementations are synchronous and CPU-bound; the
//! generator runs them on the blocking pool.
//!
//! [`ConstraintProver`] is the shipped backend. It evaluates the access
//! circuit's constraints natively:
//!
//! 1. the credential leaf folds up the supplied path to `merkleRoot`
//! 2. the record commitment is non-zero and bound into the proof
//! 3. public signals are `[recordId, H(requester), merkleRoot]`
//!
//! Proof points are field elements keyed by the artifact-derived verifying
//! key. `C` also covers the requester's credential leaf, which only the key
//! holder and the credential store can derive: a proof verifies under the
//! artifact set that produced it, for the credential it was built from, and
//! any change to a public signal invalidates it. Verification is
//! designated: the verifier supplies the leaf it holds for the requester.

use alloy::primitives::U256;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;

use super::artifacts::{CircuitArtifacts, VerifyingKey};
use super::field::{domain, hash_to_field, requester_identity, FIELD_MODULUS};
use super::inputs::CircuitInputs;
use super::types::{Proof, PublicSignals};
use crate::credentials::{compute_root, credential_leaf};
use crate::zk_error::{ZkError, ZkResult};

type HmacSha256 = Hmac<Sha256>;

/// Produces and checks proofs for the access circuit.
pub trait ProvingSystem: Send + Sync {
    /// Produce a proof. Must be a pure function of `inputs` and `artifacts`.
    ///
    /// Implementations should poll `cancel` between expensive steps and
    /// return promptly once it fires.
    fn prove(
        &self,
        inputs: &CircuitInputs,
        artifacts: &CircuitArtifacts,
        cancel: &CancellationToken,
    ) -> ZkResult<Proof>;

    /// Check a proof against a verifying key and the credential leaf the
    /// verifier holds for the proof's requester.
    fn verify(&self, key: &VerifyingKey, proof: &Proof, credential: U256) -> ZkResult<bool>;
}

/// Native evaluator for the access circuit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstraintProver;

fn checkpoint(cancel: &CancellationToken) -> ZkResult<()> {
    if cancel.is_cancelled() {
        return Err(ZkError::ProofGenerationFailed("generation cancelled".to_string()));
    }
    Ok(())
}

fn pair(tag: u8, key: &[u8; 32], witness: U256, offset: u8) -> [U256; 2] {
    let w = witness.to_be_bytes::<32>();
    [
        hash_to_field(tag, &[key, &w, &[offset]]),
        hash_to_field(tag, &[key, &w, &[offset + 1]]),
    ]
}

/// `C` coordinates: a MAC over the credential leaf, `A`, `B` and the public
/// signals.
fn seal(
    key: &VerifyingKey,
    credential: U256,
    a: &[U256; 2],
    b: &[[U256; 2]; 2],
    signals: &PublicSignals,
) -> ZkResult<[U256; 2]> {
    let mut out = [U256::ZERO; 2];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key.material())
            .map_err(ZkError::generation)?;
        mac.update(&[domain::PROOF_C, i as u8]);
        mac.update(&credential.to_be_bytes::<32>());
        for v in a.iter().chain(b.iter().flatten()).chain(signals.to_array().iter()) {
            mac.update(&v.to_be_bytes::<32>());
        }
        let digest: [u8; 32] = mac.finalize().into_bytes().into();
        *slot = U256::from_be_bytes(digest) % FIELD_MODULUS;
    }
    Ok(out)
}

impl ProvingSystem for ConstraintProver {
    fn prove(
        &self,
        inputs: &CircuitInputs,
        artifacts: &CircuitArtifacts,
        cancel: &CancellationToken,
    ) -> ZkResult<Proof> {
        checkpoint(cancel)?;
        inputs.validate()?;

        let leaf = credential_leaf(&inputs.access_key, inputs.record_id, &inputs.requester);
        let folded = compute_root(leaf, &inputs.path_elements, &inputs.path_indices)
            .ok_or_else(|| ZkError::generation("malformed authentication path"))?;
        if folded != inputs.merkle_root {
            return Err(ZkError::generation(
                "constraint unsatisfied: credential is not a member of merkleRoot",
            ));
        }
        checkpoint(cancel)?;

        let signals = PublicSignals {
            record_id: inputs.record_id.as_u256(),
            requester_identity: requester_identity(&inputs.requester),
            merkle_root: inputs.merkle_root,
        };

        let key = artifacts.verifying_key();
        let witness = hash_to_field(
            domain::LEAF,
            &[
                &leaf.to_be_bytes::<32>(),
                &inputs.record_commitment.to_be_bytes::<32>(),
                &inputs.timestamp.to_be_bytes(),
            ],
        );
        let a = pair(domain::PROOF_A, key.material(), witness, 0);
        let b0 = pair(domain::PROOF_B, key.material(), witness, 0);
        let b1 = pair(domain::PROOF_B, key.material(), witness, 2);
        let b = [b0, b1];
        checkpoint(cancel)?;

        let c = seal(key, leaf, &a, &b, &signals)?;
        Ok(Proof {
            a,
            b,
            c,
            public_signals: signals,
        })
    }

    fn verify(&self, key: &VerifyingKey, proof: &Proof, credential: U256) -> ZkResult<bool> {
        let in_field = proof
            .a
            .iter()
            .chain(proof.b.iter().flatten())
            .chain(proof.c.iter())
            .chain(proof.public_signals.to_array().iter())
            .all(|v| *v < FIELD_MODULUS);
        if !in_field {
            return Ok(false);
        }
        let expected = seal(key, credential, &proof.a, &proof.b, &proof.public_signals)?;
        Ok(expected == proof.c)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::Address;

    use super::*;
    use crate::credentials::CredentialStore;
    use crate::models::RecordId;
    use crate::proof::inputs::ProofInputBuilder;

    fn leaf(inputs: &CircuitInputs) -> U256 {
        credential_leaf(&inputs.access_key, inputs.record_id, &inputs.requester)
    }

    fn setup() -> (CircuitInputs, CircuitArtifacts) {
        let store = Arc::new(CredentialStore::new(b"prover".to_vec()));
        let owner = Address::from([1u8; 20]);
        let record = RecordId::new(11);
        let (key, _) = store.register_record(record, owner, owner).unwrap();
        let inputs = ProofInputBuilder::new(store).build(owner, record, key).unwrap();
        let artifacts = CircuitArtifacts::from_bytes(b"wasm", b"zkey").unwrap();
        (inputs, artifacts)
    }

    #[test]
    fn valid_inputs_prove_and_verify() {
        let (inputs, artifacts) = setup();
        let proof = ConstraintProver
            .prove(&inputs, &artifacts, &CancellationToken::new())
            .unwrap();
        assert_eq!(proof.public_signals.record_id, U256::from(11u64));
        assert_eq!(proof.public_signals.merkle_root, inputs.merkle_root);
        assert!(ConstraintProver
            .verify(artifacts.verifying_key(), &proof, leaf(&inputs))
            .unwrap());
    }

    #[test]
    fn proving_is_deterministic() {
        let (inputs, artifacts) = setup();
        let token = CancellationToken::new();
        let p1 = ConstraintProver.prove(&inputs, &artifacts, &token).unwrap();
        let p2 = ConstraintProver.prove(&inputs, &artifacts, &token).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn wrong_access_key_fails_constraints() {
        let (mut inputs, artifacts) = setup();
        inputs.access_key = crate::models::AccessKey::from_bytes([9u8; 32]);
        let err = ConstraintProver
            .prove(&inputs, &artifacts, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ZkError::ProofGenerationFailed(_)));
    }

    #[test]
    fn tampered_public_signal_fails_verification() {
        let (inputs, artifacts) = setup();
        let mut proof = ConstraintProver
            .prove(&inputs, &artifacts, &CancellationToken::new())
            .unwrap();
        proof.public_signals.record_id = U256::from(12u64);
        assert!(!ConstraintProver
            .verify(artifacts.verifying_key(), &proof, leaf(&inputs))
            .unwrap());
    }

    #[test]
    fn other_artifacts_do_not_verify() {
        let (inputs, artifacts) = setup();
        let proof = ConstraintProver
            .prove(&inputs, &artifacts, &CancellationToken::new())
            .unwrap();
        let other = CircuitArtifacts::from_bytes(b"wasm", b"other").unwrap();
        assert!(!ConstraintProver
            .verify(other.verifying_key(), &proof, leaf(&inputs))
            .unwrap());
    }

    #[test]
    fn proof_sealed_without_the_credential_does_not_verify() {
        let (inputs, artifacts) = setup();
        let mut proof = ConstraintProver
            .prove(&inputs, &artifacts, &CancellationToken::new())
            .unwrap();
        let key = artifacts.verifying_key();
        proof.c = seal(key, U256::from(1u64), &proof.a, &proof.b, &proof.public_signals).unwrap();
        assert!(!ConstraintProver.verify(key, &proof, leaf(&inputs)).unwrap());
        assert!(!ConstraintProver.verify(key, &proof, U256::ZERO).unwrap());
    }

    #[test]
    fn cancelled_token_stops_generation() {
        let (inputs, artifacts) = setup();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            ConstraintProver.prove(&inputs, &artifacts, &token),
            Err(ZkError::ProofGenerationFailed(_))
        ));
    }
}
