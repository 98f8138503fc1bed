// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authoritative store of access credentials and per-record Merkle roots.
//!
//! ## Consistency
//!
//! Each record's membership set, access keys and Merkle tree live behind a
//! single `RwLock`. `grant` and `revoke` rebuild the tree and swap it in
//! while holding the write lock, so readers observe either the old root and
//! path or the new ones, never a mix. Proofs built against an older root fail
//! verification.
//!
//! ## Canonical ordering
//!
//! Leaves are ordered by ascending requester address bytes (`BTreeMap`
//! iteration order), so the root depends only on the membership set.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::merkle::{MerkleTree, MAX_LEAVES};
use crate::models::{AccessKey, RecordId};
use crate::proof::field::{domain, hash_to_field};
use crate::zk_error::{ZkError, ZkResult};

type HmacSha256 = Hmac<Sha256>;

/// A requester's credential for one record.
#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub record_id: RecordId,
    pub requester: Address,
    pub access_key: AccessKey,
    pub issued_at: DateTime<Utc>,
}

/// Membership proof for one requester against the current root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleCommitment {
    pub record_id: RecordId,
    pub root: U256,
    pub leaf_index: usize,
    pub path_elements: Vec<U256>,
    pub path_indices: Vec<u8>,
}

/// Parties recorded at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordParties {
    pub owner: Address,
    pub issuer: Address,
}

struct RecordCredentials {
    parties: RecordParties,
    commitment: U256,
    members: BTreeMap<Address, AccessCredential>,
    /// Bumped on revoke so a later re-grant derives a fresh key.
    epochs: HashMap<Address, u64>,
    tree: MerkleTree,
}

/// Merkle leaf binding an access key to a record and requester.
pub fn credential_leaf(access_key: &AccessKey, record_id: RecordId, requester: &Address) -> U256 {
    hash_to_field(
        domain::LEAF,
        &[
            &access_key.to_field().to_be_bytes::<32>(),
            &record_id.to_be_bytes(),
            requester.as_slice(),
        ],
    )
}

/// Commitment to a record's identity and parties.
pub fn record_commitment(record_id: RecordId, parties: &RecordParties) -> U256 {
    hash_to_field(
        domain::RECORD_COMMITMENT,
        &[
            &record_id.to_be_bytes(),
            parties.owner.as_slice(),
            parties.issuer.as_slice(),
        ],
    )
}

impl RecordCredentials {
    fn rebuild(&mut self, record_id: RecordId) -> ZkResult<()> {
        let leaves = self
            .members
            .values()
            .map(|c| credential_leaf(&c.access_key, record_id, &c.requester))
            .collect();
        self.tree = MerkleTree::from_leaves(leaves).ok_or_else(|| {
            ZkError::InvalidInput(format!("record {record_id} exceeds {MAX_LEAVES} members"))
        })?;
        Ok(())
    }

    fn commitment_for(&self, record_id: RecordId, requester: &Address) -> ZkResult<MerkleCommitment> {
        let leaf_index = self
            .members
            .keys()
            .position(|member| member == requester)
            .ok_or_else(|| ZkError::CredentialNotFound {
                record_id: record_id.to_string(),
                requester: requester.to_string(),
            })?;
        let path = self
            .tree
            .path(leaf_index)
            .ok_or_else(|| ZkError::InvalidMerkleProof("leaf index outside tree".to_string()))?;
        Ok(MerkleCommitment {
            record_id,
            root: self.tree.root(),
            leaf_index,
            path_elements: path.elements,
            path_indices: path.indices,
        })
    }
}

/// Credential store shared across the process.
pub struct CredentialStore {
    master_secret: Vec<u8>,
    records: RwLock<HashMap<RecordId, RecordCredentials>>,
}

impl CredentialStore {
    /// Create a store deriving keys from `master_secret`.
    pub fn new(master_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            master_secret: master_secret.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RecordId, RecordCredentials>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RecordId, RecordCredentials>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn derive_key(&self, record_id: RecordId, requester: &Address, epoch: u64) -> ZkResult<AccessKey> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master_secret)
            .map_err(|e| ZkError::InvalidAccessKey(e.to_string()))?;
        mac.update(b"zk-record-gateway/access-key/v1");
        mac.update(&record_id.to_be_bytes());
        mac.update(requester.as_slice());
        mac.update(&epoch.to_be_bytes());
        Ok(AccessKey::from_bytes(mac.finalize().into_bytes().into()))
    }

    /// Register a record and grant its owner.
    ///
    /// Returns the owner's access key and the initial root. Registering an
    /// existing record is rejected.
    pub fn register_record(
        &self,
        record_id: RecordId,
        owner: Address,
        issuer: Address,
    ) -> ZkResult<(AccessKey, U256)> {
        let mut records = self.write();
        if records.contains_key(&record_id) {
            return Err(ZkError::InvalidInput(format!("record {record_id} already registered")));
        }
        let parties = RecordParties { owner, issuer };
        let entry = records.entry(record_id).or_insert(RecordCredentials {
            parties,
            commitment: record_commitment(record_id, &parties),
            members: BTreeMap::new(),
            epochs: HashMap::new(),
            tree: MerkleTree::empty(),
        });
        let granted = self.insert_member(entry, record_id, owner)?;

        tracing::info!(record_id = %record_id, owner = %owner, "Record registered");
        Ok(granted)
    }

    /// Grant `requester` access to `record_id`.
    ///
    /// Idempotent: an existing member keeps its key and the root is unchanged.
    pub fn grant(&self, record_id: RecordId, requester: Address) -> ZkResult<(AccessKey, U256)> {
        let mut records = self.write();
        let entry = records
            .get_mut(&record_id)
            .ok_or_else(|| ZkError::NotFound(format!("record {record_id}")))?;

        self.insert_member(entry, record_id, requester)
    }

    fn insert_member(
        &self,
        entry: &mut RecordCredentials,
        record_id: RecordId,
        requester: Address,
    ) -> ZkResult<(AccessKey, U256)> {
        if let Some(existing) = entry.members.get(&requester) {
            return Ok((existing.access_key, entry.tree.root()));
        }
        if entry.members.len() >= MAX_LEAVES {
            return Err(ZkError::InvalidInput(format!(
                "record {record_id} already has {MAX_LEAVES} members"
            )));
        }

        let epoch = entry.epochs.get(&requester).copied().unwrap_or(0);
        let access_key = self.derive_key(record_id, &requester, epoch)?;
        entry.members.insert(
            requester,
            AccessCredential {
                record_id,
                requester,
                access_key,
                issued_at: Utc::now(),
            },
        );
        entry.rebuild(record_id)?;
        let root = entry.tree.root();

        tracing::info!(
            record_id = %record_id,
            requester = %requester,
            members = entry.members.len(),
            "Access granted, root updated"
        );
        Ok((access_key, root))
    }

    /// Revoke `requester`'s credential and return the new root.
    pub fn revoke(&self, record_id: RecordId, requester: Address) -> ZkResult<U256> {
        let mut records = self.write();
        let entry = records
            .get_mut(&record_id)
            .ok_or_else(|| ZkError::NotFound(format!("record {record_id}")))?;

        if requester == entry.parties.owner {
            return Err(ZkError::InvalidInput(
                "the record owner's credential cannot be revoked".to_string(),
            ));
        }
        if entry.members.remove(&requester).is_none() {
            return Err(ZkError::CredentialNotFound {
                record_id: record_id.to_string(),
                requester: requester.to_string(),
            });
        }
        *entry.epochs.entry(requester).or_insert(0) += 1;
        entry.rebuild(record_id)?;
        let root = entry.tree.root();

        tracing::info!(
            record_id = %record_id,
            requester = %requester,
            members = entry.members.len(),
            "Access revoked, root updated"
        );
        Ok(root)
    }

    /// Current authentication path for `requester`.
    pub fn get_path(&self, record_id: RecordId, requester: &Address) -> ZkResult<MerkleCommitment> {
        let records = self.read();
        let entry = records.get(&record_id).ok_or_else(|| ZkError::CredentialNotFound {
            record_id: record_id.to_string(),
            requester: requester.to_string(),
        })?;
        entry.commitment_for(record_id, requester)
    }

    /// Authentication path, released only to a holder of the matching key.
    ///
    /// Deterministic for a given membership set.
    pub fn generate_merkle_proof(
        &self,
        access_key: &AccessKey,
        record_id: RecordId,
        requester: &Address,
    ) -> ZkResult<MerkleCommitment> {
        let credential = self
            .credential(record_id, requester)
            .ok_or_else(|| ZkError::CredentialNotFound {
                record_id: record_id.to_string(),
                requester: requester.to_string(),
            })?;
        if !credential.access_key.ct_eq(access_key) {
            return Err(ZkError::InvalidAccessKey(
                "presented key does not match the issued credential".to_string(),
            ));
        }
        self.get_path(record_id, requester)
    }

    pub fn has_access(&self, record_id: RecordId, requester: &Address) -> bool {
        self.read()
            .get(&record_id)
            .is_some_and(|entry| entry.members.contains_key(requester))
    }

    pub fn root(&self, record_id: RecordId) -> Option<U256> {
        self.read().get(&record_id).map(|entry| entry.tree.root())
    }

    pub fn record_commitment(&self, record_id: RecordId) -> Option<U256> {
        self.read().get(&record_id).map(|entry| entry.commitment)
    }

    pub fn record_parties(&self, record_id: RecordId) -> Option<RecordParties> {
        self.read().get(&record_id).map(|entry| entry.parties)
    }

    pub fn credential(&self, record_id: RecordId, requester: &Address) -> Option<AccessCredential> {
        self.read()
            .get(&record_id)
            .and_then(|entry| entry.members.get(requester).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::merkle::{compute_root, TREE_DEPTH};

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn store_with_record() -> (CredentialStore, RecordId, AccessKey) {
        let store = CredentialStore::new(b"test-master-secret".to_vec());
        let record = RecordId::new(1);
        let (owner_key, _) = store.register_record(record, addr(1), addr(2)).unwrap();
        (store, record, owner_key)
    }

    #[test]
    fn owner_is_granted_on_registration() {
        let (store, record, owner_key) = store_with_record();
        assert!(store.has_access(record, &addr(1)));
        assert!(!store.has_access(record, &addr(2)));
        let cred = store.credential(record, &addr(1)).unwrap();
        assert_eq!(cred.access_key, owner_key);
    }

    #[test]
    fn grant_changes_root_and_path_verifies() {
        let (store, record, _) = store_with_record();
        let before = store.root(record).unwrap();
        let (key, root) = store.grant(record, addr(9)).unwrap();
        assert_ne!(before, root);

        let commitment = store.get_path(record, &addr(9)).unwrap();
        assert_eq!(commitment.root, root);
        assert_eq!(commitment.path_elements.len(), TREE_DEPTH);
        let leaf = credential_leaf(&key, record, &addr(9));
        assert_eq!(
            compute_root(leaf, &commitment.path_elements, &commitment.path_indices),
            Some(root)
        );
    }

    #[test]
    fn stale_path_does_not_match_new_root() {
        let (store, record, _) = store_with_record();
        let (key, _) = store.grant(record, addr(9)).unwrap();
        let stale = store.get_path(record, &addr(9)).unwrap();

        store.grant(record, addr(5)).unwrap();
        let fresh_root = store.root(record).unwrap();

        let leaf = credential_leaf(&key, record, &addr(9));
        let folded = compute_root(leaf, &stale.path_elements, &stale.path_indices).unwrap();
        assert_ne!(folded, fresh_root);
    }

    #[test]
    fn grant_is_idempotent() {
        let (store, record, _) = store_with_record();
        let (k1, r1) = store.grant(record, addr(3)).unwrap();
        let (k2, r2) = store.grant(record, addr(3)).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(r1, r2);
    }

    #[test]
    fn revoke_then_regrant_issues_fresh_key() {
        let (store, record, _) = store_with_record();
        let (k1, _) = store.grant(record, addr(3)).unwrap();
        store.revoke(record, addr(3)).unwrap();
        assert!(!store.has_access(record, &addr(3)));
        let (k2, _) = store.grant(record, addr(3)).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn root_is_independent_of_grant_order() {
        let a = CredentialStore::new(b"s".to_vec());
        let b = CredentialStore::new(b"s".to_vec());
        let record = RecordId::new(5);
        a.register_record(record, addr(1), addr(1)).unwrap();
        b.register_record(record, addr(1), addr(1)).unwrap();

        a.grant(record, addr(7)).unwrap();
        a.grant(record, addr(4)).unwrap();
        b.grant(record, addr(4)).unwrap();
        b.grant(record, addr(7)).unwrap();
        assert_eq!(a.root(record), b.root(record));
        assert_eq!(
            a.get_path(record, &addr(7)).unwrap(),
            b.get_path(record, &addr(7)).unwrap()
        );
    }

    #[test]
    fn get_path_requires_credential() {
        let (store, record, _) = store_with_record();
        let err = store.get_path(record, &addr(8)).unwrap_err();
        assert!(matches!(err, ZkError::CredentialNotFound { .. }));
        let err = store.get_path(RecordId::new(99), &addr(1)).unwrap_err();
        assert!(matches!(err, ZkError::CredentialNotFound { .. }));
    }

    #[test]
    fn owner_cannot_be_revoked_and_unknown_member_fails() {
        let (store, record, _) = store_with_record();
        assert!(matches!(
            store.revoke(record, addr(1)),
            Err(ZkError::InvalidInput(_))
        ));
        assert!(matches!(
            store.revoke(record, addr(6)),
            Err(ZkError::CredentialNotFound { .. })
        ));
    }

    #[test]
    fn merkle_proof_is_deterministic_and_key_checked() {
        let (store, record, _) = store_with_record();
        let (key_a, _) = store.grant(record, addr(3)).unwrap();
        let (key_b, _) = store.grant(record, addr(4)).unwrap();

        let p1 = store.generate_merkle_proof(&key_a, record, &addr(3)).unwrap();
        let p2 = store.generate_merkle_proof(&key_a, record, &addr(3)).unwrap();
        assert_eq!(p1, p2);

        let other = store.generate_merkle_proof(&key_b, record, &addr(4)).unwrap();
        assert_ne!(p1.path_elements, other.path_elements);

        let err = store
            .generate_merkle_proof(&key_b, record, &addr(3))
            .unwrap_err();
        assert!(matches!(err, ZkError::InvalidAccessKey(_)));
    }

    #[test]
    fn record_commitment_binds_parties() {
        let (store, record, _) = store_with_record();
        let parties = store.record_parties(record).unwrap();
        assert_eq!(parties.owner, addr(1));
        assert_eq!(parties.issuer, addr(2));
        assert_eq!(
            store.record_commitment(record),
            Some(record_commitment(record, &parties))
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (store, record, _) = store_with_record();
        assert!(store.register_record(record, addr(1), addr(2)).is_err());
        assert!(matches!(
            store.grant(RecordId::new(77), addr(1)),
            Err(ZkError::NotFound(_))
        ));
    }
}
