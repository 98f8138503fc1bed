// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger.
//!
//! Mirrors the registry contract on top of the [`CredentialStore`] for
//! development and tests. Each member of a record holds its own copy of the
//! reference, sealed under that member's access key. Sharing seals a new
//! copy for the grantee; unsharing drops the grantee's copy and rotates the
//! root.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use alloy::primitives::{keccak256, Address, B256, U256};
use chrono::Utc;

use super::{EncryptedRecord, LedgerError};
use crate::credentials::{credential_leaf, CredentialStore};
use crate::models::{AccessKey, RecordId};
use crate::proof::artifacts::VerifyingKey;
use crate::proof::field::requester_identity;
use crate::proof::system::ProvingSystem;
use crate::proof::types::Proof;
use crate::vault::{ContentReference, EncryptedReferenceVault};
use crate::zk_error::{ZkError, ZkResult};

struct LocalRecord {
    owner: Address,
    timestamp: u64,
    encrypted_meta: Vec<u8>,
    sealed: HashMap<Address, Vec<u8>>,
}

pub struct LocalLedger {
    store: Arc<CredentialStore>,
    vault: EncryptedReferenceVault,
    system: Arc<dyn ProvingSystem>,
    verifying_key: Option<VerifyingKey>,
    records: RwLock<HashMap<RecordId, LocalRecord>>,
}

impl LocalLedger {
    pub fn new(
        store: Arc<CredentialStore>,
        system: Arc<dyn ProvingSystem>,
        verifying_key: Option<VerifyingKey>,
    ) -> Self {
        Self {
            store,
            vault: EncryptedReferenceVault::new(),
            system,
            verifying_key,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Publish a record and seal its reference for the owner.
    ///
    /// Returns the owner's access key.
    pub fn publish_record(
        &self,
        record_id: RecordId,
        owner: Address,
        issuer: Address,
        reference: &str,
        metadata: &str,
    ) -> ZkResult<AccessKey> {
        ContentReference::parse(reference).ok_or_else(|| {
            ZkError::InvalidInput("reference is not a content identifier".to_string())
        })?;

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record_id) {
            return Err(ZkError::InvalidInput(format!("record {record_id} already published")));
        }
        let (owner_key, _) = self.store.register_record(record_id, owner, issuer)?;
        let sealed_ref = self.vault.encrypt(reference, &owner_key)?;
        let encrypted_meta = self.vault.encrypt(metadata, &owner_key)?;

        records.insert(
            record_id,
            LocalRecord {
                owner,
                timestamp: Utc::now().timestamp().max(0) as u64,
                encrypted_meta,
                sealed: HashMap::from([(owner, sealed_ref)]),
            },
        );
        tracing::info!(record_id = %record_id, owner = %owner, "Record published to local ledger");
        Ok(owner_key)
    }

    /// Grant `grantee` and seal a copy of the reference under its key.
    pub fn share(
        &self,
        record_id: RecordId,
        granter: Address,
        grantee: Address,
    ) -> ZkResult<AccessKey> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(&record_id)
            .ok_or_else(|| ZkError::NotFound(format!("record {record_id}")))?;
        if granter != record.owner {
            return Err(ZkError::AccessDenied("only the record owner can share".to_string()));
        }

        let owner_key = self
            .store
            .credential(record_id, &record.owner)
            .map(|c| c.access_key)
            .ok_or_else(|| ZkError::CredentialNotFound {
                record_id: record_id.to_string(),
                requester: record.owner.to_string(),
            })?;
        let owner_copy = record
            .sealed
            .get(&record.owner)
            .ok_or_else(|| ZkError::DecryptionFailed("owner copy missing".to_string()))?;
        let reference = self.vault.decrypt(owner_copy, &owner_key)?;

        let (grantee_key, _) = self.store.grant(record_id, grantee)?;
        let sealed = self.vault.encrypt(&reference, &grantee_key)?;
        record.sealed.insert(grantee, sealed);
        Ok(grantee_key)
    }

    /// Revoke `grantee`, drop its sealed copy and return the new root.
    pub fn unshare(
        &self,
        record_id: RecordId,
        granter: Address,
        grantee: Address,
    ) -> ZkResult<U256> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(&record_id)
            .ok_or_else(|| ZkError::NotFound(format!("record {record_id}")))?;
        if granter != record.owner {
            return Err(ZkError::AccessDenied("only the record owner can unshare".to_string()));
        }
        let root = self.store.revoke(record_id, grantee)?;
        record.sealed.remove(&grantee);
        Ok(root)
    }

    pub fn has_access(&self, record_id: RecordId, requester: Address) -> bool {
        self.store.has_access(record_id, &requester)
    }

    pub fn verify_proof(&self, proof: &Proof) -> Result<bool, LedgerError> {
        let key = self
            .verifying_key
            .as_ref()
            .ok_or_else(|| LedgerError::NotDeployed("local verifying key not loaded".to_string()))?;
        let Some(leaf) = self.credential_leaf_for(proof) else {
            return Ok(false);
        };
        self.system
            .verify(key, proof, leaf)
            .map_err(|e| LedgerError::Contract(e.to_string()))
    }

    /// Leaf of the member whose identity the proof claims.
    fn credential_leaf_for(&self, proof: &Proof) -> Option<U256> {
        let record_id = RecordId(proof.public_signals.record_id);
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let member = records
            .get(&record_id)?
            .sealed
            .keys()
            .find(|member| requester_identity(member) == proof.public_signals.requester_identity)
            .copied()?;
        drop(records);
        let credential = self.store.credential(record_id, &member)?;
        Some(credential_leaf(&credential.access_key, record_id, &member))
    }

    /// Proof is valid, bound to `record_id` and built against the live root.
    pub fn verify_access(&self, record_id: RecordId, proof: &Proof) -> Result<bool, LedgerError> {
        if !proof.is_bound_to(record_id) {
            return Ok(false);
        }
        if self.store.root(record_id) != Some(proof.public_signals.merkle_root) {
            return Ok(false);
        }
        self.verify_proof(proof)
    }

    /// Hash of the sealed copy belonging to the proof's requester.
    pub fn get_encrypted_hash(
        &self,
        record_id: RecordId,
        proof: &Proof,
    ) -> Result<B256, LedgerError> {
        if !self.verify_access(record_id, proof)? {
            return Err(LedgerError::Contract("execution reverted: invalid proof".to_string()));
        }
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get(&record_id)
            .ok_or_else(|| LedgerError::Contract("execution reverted: unknown record".to_string()))?;
        record
            .sealed
            .iter()
            .find(|(member, _)| {
                requester_identity(member) == proof.public_signals.requester_identity
            })
            .map(|(_, sealed)| keccak256(sealed))
            .ok_or_else(|| LedgerError::Contract("execution reverted: no sealed copy".to_string()))
    }

    /// Record as seen by `requester`; unknown records come back with
    /// `exists = false` like the contract's zero struct.
    pub fn get_encrypted_record(&self, record_id: RecordId, requester: Address) -> EncryptedRecord {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        match records.get(&record_id) {
            Some(record) => EncryptedRecord {
                record_id,
                encrypted_ref: record.sealed.get(&requester).cloned().unwrap_or_default(),
                encrypted_meta: record.encrypted_meta.clone(),
                merkle_root: self.store.root(record_id).unwrap_or_default(),
                timestamp: record.timestamp,
                owner: record.owner,
                exists: true,
            },
            None => EncryptedRecord::absent(record_id),
        }
    }

    /// Zero key when `requester` holds no credential.
    pub fn get_user_access_key(&self, record_id: RecordId, requester: Address) -> AccessKey {
        self.store
            .credential(record_id, &requester)
            .map(|c| c.access_key)
            .unwrap_or_else(|| AccessKey::from_bytes([0u8; 32]))
    }

    pub fn record_issuer(&self, record_id: RecordId) -> Option<Address> {
        self.store.record_parties(record_id).map(|p| p.issuer)
    }
}
