// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Pipeline
//!
//! End-to-end record access, run under the [`ResilienceLayer`].
//!
//! ## Server Flow
//!
//! A requester submits a proof. The pipeline rate-limits the caller,
//! verifies the proof, fetches the requester's access key and opens the
//! sealed reference.
//!
//! ## Client Flow
//!
//! [`AccessPipeline::request_access`] starts from the requester's own access
//! key: fetch the current Merkle path, generate a proof on the blocking
//! pool, verify it, then open the reference locally.
//!
//! When the proof machinery is unavailable, owners, issuers and admins get a
//! [`AccessMode::LegacyFallback`] result carrying an advisory. A fallback
//! grant releases the content reference only to a caller that presented the
//! requester's access key (client flow). The server flow takes the
//! requester address from the request body, so its fallback reports status
//! and public metadata only.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;
use utoipa::ToSchema;

use crate::credentials::RecordParties;
use crate::ledger::{EncryptedRecord, LedgerClient};
use crate::models::{AccessKey, RecordId};
use crate::proof::{Proof, ProofGenerator, ProofInputBuilder, ProofPayload, ProofVerifier};
use crate::resilience::{AccessOutcome, ResilienceLayer, ResilienceState};
use crate::roles::Role;
use crate::vault::{ContentReference, EncryptedReferenceVault};
use crate::zk_error::{ZkError, ZkResult};

/// How access to a record was established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccessMode {
    ZkVerified,
    LegacyFallback { role: Role, advisory: String },
}

impl AccessMode {
    pub fn is_verified(&self) -> bool {
        matches!(self, AccessMode::ZkVerified)
    }
}

#[derive(Debug, Clone)]
pub struct RecordAccess {
    pub record_id: RecordId,
    /// Absent only when a fallback grant could not read the ledger.
    pub record: Option<EncryptedRecord>,
    /// Withheld on fallback unless the caller proved key possession.
    pub reference: Option<ContentReference>,
    pub mode: AccessMode,
    pub trail: Vec<ResilienceState>,
}

/// Verified or fallback-granted payload of one attempt.
struct Opened {
    record: EncryptedRecord,
    reference: ContentReference,
}

pub struct AccessPipeline {
    ledger: LedgerClient,
    verifier: ProofVerifier,
    generator: Arc<ProofGenerator>,
    builder: ProofInputBuilder,
    vault: EncryptedReferenceVault,
    resilience: Arc<ResilienceLayer>,
    gateway: Url,
    proof_timeout: Duration,
}

impl AccessPipeline {
    pub fn new(
        ledger: LedgerClient,
        generator: Arc<ProofGenerator>,
        builder: ProofInputBuilder,
        resilience: Arc<ResilienceLayer>,
        gateway: Url,
        proof_timeout: Duration,
    ) -> Self {
        Self {
            verifier: ProofVerifier::new(ledger.clone()),
            ledger,
            generator,
            builder,
            vault: EncryptedReferenceVault::new(),
            resilience,
            gateway,
            proof_timeout,
        }
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    pub fn resilience(&self) -> &Arc<ResilienceLayer> {
        &self.resilience
    }

    pub fn generator(&self) -> &Arc<ProofGenerator> {
        &self.generator
    }

    // ========== Read-only queries ==========

    /// Record as visible without a proof (no sealed reference).
    pub async fn record_metadata(&self, record_id: RecordId) -> ZkResult<EncryptedRecord> {
        let record = self
            .resilience
            .retrying("record_metadata", move || async move {
                Ok(self.ledger.get_encrypted_record(record_id, Address::ZERO).await?)
            })
            .await?;
        if !record.exists {
            return Err(ZkError::NotFound(format!("record {record_id}")));
        }
        Ok(EncryptedRecord {
            encrypted_ref: Vec::new(),
            ..record
        })
    }

    /// Membership only; no proof and no reference.
    pub async fn document_access_status(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> ZkResult<bool> {
        self.resilience
            .retrying("document_access_status", move || async move {
                Ok(self.ledger.has_access(record_id, requester).await?)
            })
            .await
    }

    // ========== Server flow ==========

    /// Verify a submitted proof and open the requester's reference.
    pub async fn open_record(
        &self,
        client_id: &str,
        record_id: RecordId,
        requester: Address,
        payload: &ProofPayload,
    ) -> ZkResult<RecordAccess> {
        self.resilience.admit(client_id)?;

        let resolution = self
            .resilience
            .execute(
                "open_record",
                &requester,
                move || self.verify_and_open(payload, record_id, requester),
                move || self.record_parties(record_id),
            )
            .await?;

        let access = self
            .finish(record_id, requester, None, resolution.outcome, resolution.trail)
            .await;
        tracing::info!(
            record_id = %record_id,
            requester = %requester,
            verified = access.mode.is_verified(),
            "Record opened"
        );
        Ok(access)
    }

    /// [`open_record`](Self::open_record), then resolve the reference on the
    /// configured gateway.
    pub async fn resolve_document(
        &self,
        client_id: &str,
        record_id: RecordId,
        requester: Address,
        payload: &ProofPayload,
    ) -> ZkResult<(Url, AccessMode)> {
        let access = self.open_record(client_id, record_id, requester, payload).await?;
        let reference = access.reference.ok_or_else(|| {
            ZkError::AccessDenied("document reference is unavailable for this requester".to_string())
        })?;
        Ok((reference.gateway_url(&self.gateway)?, access.mode))
    }

    async fn verify_and_open(
        &self,
        payload: &ProofPayload,
        record_id: RecordId,
        requester: Address,
    ) -> ZkResult<Opened> {
        let verified = self.verifier.verify(payload, record_id, requester).await?;
        let key = self.ledger.get_user_access_key(record_id, requester).await?;
        if key.is_zero() {
            return Err(ZkError::InvalidAccessKey(format!(
                "no access key for requester on record {record_id}"
            )));
        }
        let attested = self.ledger.get_encrypted_hash(record_id, &verified.proof).await?;
        if keccak256(&verified.record.encrypted_ref) != attested {
            return Err(ZkError::DecryptionFailed(
                "sealed reference does not match the registry hash".to_string(),
            ));
        }
        let reference = self.vault.open_reference(&verified.record.encrypted_ref, &key)?;
        Ok(Opened {
            record: verified.record,
            reference,
        })
    }

    // ========== Client flow ==========

    /// Build, prove, verify and decrypt with the requester's own key.
    pub async fn request_access(
        &self,
        client_id: &str,
        requester: Address,
        record_id: RecordId,
        access_key: AccessKey,
        cancel: &CancellationToken,
    ) -> ZkResult<RecordAccess> {
        self.resilience.admit(client_id)?;

        let resolution = self
            .resilience
            .execute(
                "request_access",
                &requester,
                move || self.prove_and_open(requester, record_id, access_key, cancel),
                move || self.record_parties(record_id),
            )
            .await?;

        Ok(self
            .finish(record_id, requester, Some(&access_key), resolution.outcome, resolution.trail)
            .await)
    }

    /// Build inputs from the current Merkle path and generate a proof.
    ///
    /// Always uses a fresh path: a proof against a stale root fails
    /// verification.
    pub async fn generate_proof(
        &self,
        requester: Address,
        record_id: RecordId,
        access_key: AccessKey,
        cancel: &CancellationToken,
    ) -> ZkResult<Proof> {
        let inputs = self.builder.build(requester, record_id, access_key)?;
        self.generator
            .generate_with_deadline(inputs, self.proof_timeout, cancel)
            .await
    }

    async fn prove_and_open(
        &self,
        requester: Address,
        record_id: RecordId,
        access_key: AccessKey,
        cancel: &CancellationToken,
    ) -> ZkResult<Opened> {
        let proof = self.generate_proof(requester, record_id, access_key, cancel).await?;
        let verified = self
            .verifier
            .verify(&proof.to_payload(), record_id, requester)
            .await?;
        let reference = self.vault.open_reference(&verified.record.encrypted_ref, &access_key)?;
        Ok(Opened {
            record: verified.record,
            reference,
        })
    }

    // ========== Fallback support ==========

    /// Owner and issuer as recorded on the ledger.
    async fn record_parties(&self, record_id: RecordId) -> Option<RecordParties> {
        let record = match self.ledger.get_encrypted_record(record_id, Address::ZERO).await {
            Ok(record) if record.exists => record,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(record_id = %record_id, error = %e, "Cannot resolve record parties");
                return None;
            }
        };
        let issuer = self
            .ledger
            .record_issuer(record_id)
            .await
            .ok()
            .flatten()
            .unwrap_or(Address::ZERO);
        Some(RecordParties {
            owner: record.owner,
            issuer,
        })
    }

    /// Best-effort read of the requester's sealed reference without a proof.
    ///
    /// Opens only with a `presented` key equal to the one the ledger holds
    /// for `requester`.
    async fn legacy_open(
        &self,
        record_id: RecordId,
        requester: Address,
        presented: &AccessKey,
    ) -> Option<Opened> {
        let key = self.ledger.get_user_access_key(record_id, requester).await.ok()?;
        if key.is_zero() || !key.ct_eq(presented) {
            tracing::warn!(
                record_id = %record_id,
                requester = %requester,
                "Fallback caller does not hold the requester's access key"
            );
            return None;
        }
        let record = self.ledger.get_encrypted_record(record_id, requester).await.ok()?;
        if !record.exists || record.encrypted_ref.is_empty() {
            return None;
        }
        let reference = self.vault.open_reference(&record.encrypted_ref, &key).ok()?;
        Some(Opened { record, reference })
    }

    /// Public view of the record for a fallback that withholds the reference.
    async fn legacy_metadata(&self, record_id: RecordId) -> Option<EncryptedRecord> {
        let record = self.ledger.get_encrypted_record(record_id, Address::ZERO).await.ok()?;
        record.exists.then(|| EncryptedRecord {
            encrypted_ref: Vec::new(),
            ..record
        })
    }

    async fn finish(
        &self,
        record_id: RecordId,
        requester: Address,
        presented: Option<&AccessKey>,
        outcome: AccessOutcome<Opened>,
        trail: Vec<ResilienceState>,
    ) -> RecordAccess {
        match outcome {
            AccessOutcome::Verified(opened) => RecordAccess {
                record_id,
                record: Some(opened.record),
                reference: Some(opened.reference),
                mode: AccessMode::ZkVerified,
                trail,
            },
            AccessOutcome::Fallback(decision) => {
                let opened = match presented {
                    Some(key) => self.legacy_open(record_id, requester, key).await,
                    None => None,
                };
                let (record, reference) = match opened {
                    Some(o) => (Some(o.record), Some(o.reference)),
                    None => (self.legacy_metadata(record_id).await, None),
                };
                RecordAccess {
                    record_id,
                    record,
                    reference,
                    mode: AccessMode::LegacyFallback {
                        role: decision.role,
                        advisory: decision.advisory,
                    },
                    trail,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::ledger::LocalLedger;
    use crate::proof::{CircuitArtifacts, ConstraintProver, ProvingSystem};
    use crate::resilience::{ErrorHistory, FallbackPolicy, RateLimiter, RetryPolicy};
    use crate::roles::RoleDirectory;
    use crate::zk_error::ZkErrorKind;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const RECORD: u64 = 11;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    struct Fixture {
        pipeline: AccessPipeline,
        local: Arc<LocalLedger>,
        artifacts: CircuitArtifacts,
        owner_key: AccessKey,
    }

    fn fixture(circuit_loaded: bool, max_requests: u32) -> Fixture {
        fixture_with(circuit_loaded, max_requests, true)
    }

    fn fixture_with(circuit_loaded: bool, max_requests: u32, verifier_deployed: bool) -> Fixture {
        let artifacts = CircuitArtifacts::from_bytes(b"wasm", b"zkey").unwrap();
        let store = Arc::new(CredentialStore::new(b"pipeline".to_vec()));
        let system: Arc<dyn ProvingSystem> = Arc::new(ConstraintProver);
        let local = Arc::new(LocalLedger::new(
            store.clone(),
            system.clone(),
            verifier_deployed.then(|| artifacts.verifying_key().clone()),
        ));
        let owner_key = local
            .publish_record(RecordId::new(RECORD), addr(1), addr(2), CID, "{\"title\":\"x\"}")
            .unwrap();

        let generator = Arc::new(ProofGenerator::new(
            system,
            circuit_loaded.then(|| Arc::new(artifacts.clone())),
        ));
        let resilience = Arc::new(ResilienceLayer::new(
            RetryPolicy::new(2, Duration::ZERO),
            FallbackPolicy::default(),
            RoleDirectory::new([addr(0xAD)]),
            Arc::new(ErrorHistory::default()),
            Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60))),
        ));
        let pipeline = AccessPipeline::new(
            LedgerClient::Local(local.clone()),
            generator,
            ProofInputBuilder::new(store),
            resilience,
            Url::parse("https://ipfs.io").unwrap(),
            Duration::from_secs(5),
        );
        Fixture {
            pipeline,
            local,
            artifacts,
            owner_key,
        }
    }

    fn payload(f: &Fixture, who: Address, key: AccessKey) -> ProofPayload {
        let inputs = ProofInputBuilder::new(f.local.store().clone())
            .build(who, RecordId::new(RECORD), key)
            .unwrap();
        ConstraintProver
            .prove(&inputs, &f.artifacts, &CancellationToken::new())
            .unwrap()
            .to_payload()
    }

    #[tokio::test]
    async fn server_flow_opens_reference() {
        let f = fixture(true, 10);
        let p = payload(&f, addr(1), f.owner_key);
        let access = f
            .pipeline
            .open_record("c", RecordId::new(RECORD), addr(1), &p)
            .await
            .unwrap();
        assert_eq!(access.mode, AccessMode::ZkVerified);
        assert_eq!(access.reference.unwrap().as_str(), CID);
    }

    #[tokio::test]
    async fn resolve_document_builds_gateway_url() {
        let f = fixture(true, 10);
        let p = payload(&f, addr(1), f.owner_key);
        let (url, mode) = f
            .pipeline
            .resolve_document("c", RecordId::new(RECORD), addr(1), &p)
            .await
            .unwrap();
        assert!(mode.is_verified());
        assert_eq!(url.as_str(), format!("https://ipfs.io/ipfs/{CID}"));
    }

    #[tokio::test]
    async fn client_flow_round_trips_for_grantee() {
        let f = fixture(true, 10);
        let key = f.local.share(RecordId::new(RECORD), addr(1), addr(3)).unwrap();
        let access = f
            .pipeline
            .request_access("c", addr(3), RecordId::new(RECORD), key, &CancellationToken::new())
            .await
            .unwrap();
        assert!(access.mode.is_verified());
        assert_eq!(access.reference.unwrap().as_str(), CID);
    }

    #[tokio::test]
    async fn owner_falls_back_when_circuit_missing() {
        let f = fixture(false, 10);
        let access = f
            .pipeline
            .request_access(
                "c",
                addr(1),
                RecordId::new(RECORD),
                f.owner_key,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        match &access.mode {
            AccessMode::LegacyFallback { role, advisory } => {
                assert_eq!(*role, Role::Owner);
                assert!(!advisory.is_empty());
            }
            AccessMode::ZkVerified => panic!("expected fallback"),
        }
        assert_eq!(access.reference.unwrap().as_str(), CID);
    }

    #[tokio::test]
    async fn server_fallback_withholds_reference_from_unproven_owner_claim() {
        let f = fixture_with(true, 10, false);
        let id = RecordId::new(RECORD);
        let root = f.local.store().root(id).unwrap();
        let forged = ProofPayload {
            p_a: vec!["1".into(), "2".into()],
            p_b: vec![vec!["3".into(), "4".into()], vec!["5".into(), "6".into()]],
            p_c: vec!["7".into(), "8".into()],
            public_signals: vec![
                RECORD.to_string(),
                crate::proof::field::requester_identity(&addr(1)).to_string(),
                root.to_string(),
            ],
        };

        let access = f.pipeline.open_record("c", id, addr(1), &forged).await.unwrap();
        assert!(matches!(
            access.mode,
            AccessMode::LegacyFallback { role: Role::Owner, .. }
        ));
        assert!(access.reference.is_none());
        let record = access.record.unwrap();
        assert!(record.encrypted_ref.is_empty());
        assert_eq!(record.owner, addr(1));

        let err = f
            .pipeline
            .resolve_document("c", id, addr(1), &forged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn client_flow_rejects_wrong_key_before_fallback() {
        let f = fixture(false, 10);
        let wrong = AccessKey::from_bytes([0x42; 32]);
        let err = f
            .pipeline
            .request_access("c", addr(1), RecordId::new(RECORD), wrong, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::InvalidAccessKey);
    }

    #[tokio::test]
    async fn absent_record_is_not_found() {
        let f = fixture(true, 10);
        let p = payload(&f, addr(1), f.owner_key);
        let err = f
            .pipeline
            .open_record("c", RecordId::new(999), addr(1), &p)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stranger_gets_circuit_error_when_circuit_missing() {
        let f = fixture(false, 10);
        let key = f.local.share(RecordId::new(RECORD), addr(1), addr(3)).unwrap();
        let err = f
            .pipeline
            .request_access("c", addr(3), RecordId::new(RECORD), key, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::CircuitNotLoaded);
    }

    #[tokio::test]
    async fn non_member_is_denied() {
        let f = fixture(true, 10);
        let p = payload(&f, addr(1), f.owner_key);
        let err = f
            .pipeline
            .open_record("c", RecordId::new(RECORD), addr(9), &p)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_client() {
        let f = fixture(true, 1);
        let p = payload(&f, addr(1), f.owner_key);
        f.pipeline
            .open_record("c", RecordId::new(RECORD), addr(1), &p)
            .await
            .unwrap();
        let err = f
            .pipeline
            .open_record("c", RecordId::new(RECORD), addr(1), &p)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::RateLimitExceeded);
        assert!(f
            .pipeline
            .open_record("other", RecordId::new(RECORD), addr(1), &p)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn metadata_hides_reference_and_reports_absence() {
        let f = fixture(true, 10);
        let record = f.pipeline.record_metadata(RecordId::new(RECORD)).await.unwrap();
        assert!(record.encrypted_ref.is_empty());
        assert_eq!(record.owner, addr(1));

        let err = f.pipeline.record_metadata(RecordId::new(999)).await.unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::NotFound);
    }

    #[tokio::test]
    async fn document_status_tracks_membership() {
        let f = fixture(true, 10);
        let id = RecordId::new(RECORD);
        assert!(f.pipeline.document_access_status(id, addr(1)).await.unwrap());
        assert!(!f.pipeline.document_access_status(id, addr(4)).await.unwrap());
    }

    #[tokio::test]
    async fn unconfigured_ledger_surfaces_contract_not_initialized() {
        let f = fixture(true, 10);
        let pipeline = AccessPipeline::new(
            LedgerClient::Unconfigured("LEDGER_RPC_URL".to_string()),
            f.pipeline.generator().clone(),
            ProofInputBuilder::new(f.local.store().clone()),
            f.pipeline.resilience().clone(),
            Url::parse("https://ipfs.io").unwrap(),
            Duration::from_secs(5),
        );
        let p = payload(&f, addr(1), f.owner_key);
        let err = pipeline
            .open_record("c", RecordId::new(RECORD), addr(1), &p)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ZkErrorKind::ContractNotInitialized);
    }
}
