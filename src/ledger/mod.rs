// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration.
//!
//! The registry contract is the source of truth for record membership, the
//! live Merkle root and each member's sealed reference. [`LedgerClient`]
//! dispatches to the EVM contracts, to the in-process [`LocalLedger`], or
//! reports that no ledger is configured.

pub mod evm;
pub mod local;

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};

pub use evm::EvmLedger;
pub use local::LocalLedger;

use crate::models::{AccessKey, RecordId};
use crate::proof::types::Proof;
use crate::zk_error::{VerificationStage, ZkError};

/// Errors from ledger access.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger not configured: {0}")]
    NotConfigured(String),

    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("contract not deployed: {0}")]
    NotDeployed(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("contract error: {0}")]
    Contract(String),
}

impl From<LedgerError> for ZkError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotConfigured(_)
            | LedgerError::InvalidRpcUrl(_)
            | LedgerError::NotDeployed(_) => ZkError::ContractNotInitialized(e.to_string()),
            LedgerError::Rpc(_) => ZkError::Network(e.to_string()),
            // A revert is the contract's answer, not a transport fault.
            LedgerError::Contract(_) => {
                ZkError::rejected(VerificationStage::Cryptographic, e.to_string())
            }
        }
    }
}

/// A record as returned by `getEncryptedRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub record_id: RecordId,
    /// Reference sealed for the calling requester; empty if none.
    pub encrypted_ref: Vec<u8>,
    pub encrypted_meta: Vec<u8>,
    pub merkle_root: U256,
    pub timestamp: u64,
    pub owner: Address,
    pub exists: bool,
}

impl EncryptedRecord {
    pub fn absent(record_id: RecordId) -> Self {
        Self {
            record_id,
            encrypted_ref: Vec::new(),
            encrypted_meta: Vec::new(),
            merkle_root: U256::ZERO,
            timestamp: 0,
            owner: Address::ZERO,
            exists: false,
        }
    }
}

/// Ledger backend selected at startup.
#[derive(Clone)]
pub enum LedgerClient {
    Evm(Arc<EvmLedger>),
    Local(Arc<LocalLedger>),
    /// Names the missing setting.
    Unconfigured(String),
}

impl LedgerClient {
    pub fn describe(&self) -> &'static str {
        match self {
            LedgerClient::Evm(_) => "evm",
            LedgerClient::Local(_) => "local",
            LedgerClient::Unconfigured(_) => "unconfigured",
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, LedgerClient::Unconfigured(_))
    }

    fn unconfigured(missing: &str) -> LedgerError {
        LedgerError::NotConfigured(format!("{missing} is not set"))
    }

    pub async fn has_access(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<bool, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.has_access(record_id, requester).await,
            LedgerClient::Local(local) => Ok(local.has_access(record_id, requester)),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    /// Cryptographic check against the verifying key only.
    pub async fn verify_proof(&self, proof: &Proof) -> Result<bool, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.verify_proof(proof).await,
            LedgerClient::Local(local) => local.verify_proof(proof),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    pub async fn verify_access(
        &self,
        record_id: RecordId,
        proof: &Proof,
    ) -> Result<bool, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.verify_access(record_id, proof).await,
            LedgerClient::Local(local) => local.verify_access(record_id, proof),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    pub async fn get_encrypted_hash(
        &self,
        record_id: RecordId,
        proof: &Proof,
    ) -> Result<B256, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.get_encrypted_hash(record_id, proof).await,
            LedgerClient::Local(local) => local.get_encrypted_hash(record_id, proof),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    pub async fn get_encrypted_record(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<EncryptedRecord, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.get_encrypted_record(record_id, requester).await,
            LedgerClient::Local(local) => Ok(local.get_encrypted_record(record_id, requester)),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    pub async fn get_user_access_key(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<AccessKey, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.get_user_access_key(record_id, requester).await,
            LedgerClient::Local(local) => Ok(local.get_user_access_key(record_id, requester)),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    pub async fn record_issuer(&self, record_id: RecordId) -> Result<Option<Address>, LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.record_issuer(record_id).await,
            LedgerClient::Local(local) => Ok(local.record_issuer(record_id)),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }

    /// Reachability probe for readiness checks.
    pub async fn ping(&self) -> Result<(), LedgerError> {
        match self {
            LedgerClient::Evm(evm) => evm.block_number().await.map(|_| ()),
            LedgerClient::Local(_) => Ok(()),
            LedgerClient::Unconfigured(missing) => Err(Self::unconfigured(missing)),
        }
    }
}
