// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access credentials and the Merkle structure binding them to a record.

pub mod merkle;
pub mod store;

pub use merkle::{compute_root, MerkleTree, TREE_DEPTH};
pub use store::{
    credential_leaf, record_commitment, AccessCredential, CredentialStore, MerkleCommitment,
    RecordParties,
};
