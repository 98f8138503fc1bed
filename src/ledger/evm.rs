// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM access contracts.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::{
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    sol,
};

use super::{EncryptedRecord, LedgerError};
use crate::models::{AccessKey, RecordId};
use crate::proof::types::Proof;

sol! {
    #[sol(rpc)]
    interface IZkRecordRegistry {
        struct EncryptedRecord {
            bytes encryptedRef;
            bytes encryptedMeta;
            uint256 merkleRoot;
            uint256 timestamp;
            address owner;
            bool exists;
        }

        function hasAccess(uint256 recordId, address requester) external view returns (bool);
        function verifyAccess(uint256 recordId, uint256[2] pA, uint256[2][2] pB, uint256[2] pC, uint256[3] publicSignals) external view returns (bool);
        function getEncryptedHash(uint256 recordId, uint256[2] pA, uint256[2][2] pB, uint256[2] pC, uint256[3] publicSignals) external view returns (bytes32);
        function getEncryptedRecord(uint256 recordId) external view returns (EncryptedRecord memory);
        function getUserAccessKey(uint256 recordId, address requester) external view returns (bytes32);
        function getRecordIssuer(uint256 recordId) external view returns (address);
    }

    #[sol(rpc)]
    interface IAccessVerifier {
        function verifyProof(uint256[2] pA, uint256[2][2] pB, uint256[2] pC, uint256[3] pubSignals) external view returns (bool);
    }
}

fn classify(e: alloy::contract::Error) -> LedgerError {
    match e {
        alloy::contract::Error::TransportError(t) => LedgerError::Rpc(t.to_string()),
        alloy::contract::Error::ZeroData(..) => {
            LedgerError::NotDeployed("call returned no data".to_string())
        }
        other => LedgerError::Contract(other.to_string()),
    }
}

/// Registry and verifier contracts reached over JSON-RPC.
pub struct EvmLedger {
    registry: IZkRecordRegistry::IZkRecordRegistryInstance<DynProvider>,
    verifier: IAccessVerifier::IAccessVerifierInstance<DynProvider>,
    call_timeout: Duration,
}

impl EvmLedger {
    pub fn connect(
        rpc_url: &str,
        verifier: Address,
        registry: Address,
        call_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        tracing::info!(%verifier, %registry, "EVM ledger client configured");
        Ok(Self {
            registry: IZkRecordRegistry::new(registry, provider.clone()),
            verifier: IAccessVerifier::new(verifier, provider),
            call_timeout,
        })
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: IntoFuture<Output = Result<T, alloy::contract::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(LedgerError::Rpc(format!(
                "{call} timed out after {}ms",
                self.call_timeout.as_millis()
            ))),
        }
    }

    pub async fn has_access(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<bool, LedgerError> {
        let call = self.registry.hasAccess(record_id.as_u256(), requester);
        self.bounded("hasAccess", call.call()).await
    }

    pub async fn verify_proof(&self, proof: &Proof) -> Result<bool, LedgerError> {
        let call = self
            .verifier
            .verifyProof(proof.a, proof.b, proof.c, proof.public_signals.to_array());
        self.bounded("verifyProof", call.call()).await
    }

    pub async fn verify_access(
        &self,
        record_id: RecordId,
        proof: &Proof,
    ) -> Result<bool, LedgerError> {
        let call = self.registry.verifyAccess(
            record_id.as_u256(),
            proof.a,
            proof.b,
            proof.c,
            proof.public_signals.to_array(),
        );
        self.bounded("verifyAccess", call.call()).await
    }

    pub async fn get_encrypted_hash(
        &self,
        record_id: RecordId,
        proof: &Proof,
    ) -> Result<B256, LedgerError> {
        let call = self.registry.getEncryptedHash(
            record_id.as_u256(),
            proof.a,
            proof.b,
            proof.c,
            proof.public_signals.to_array(),
        );
        self.bounded("getEncryptedHash", call.call()).await
    }

    /// Issued with `from = requester` so the registry returns the copy
    /// sealed for that caller.
    pub async fn get_encrypted_record(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<EncryptedRecord, LedgerError> {
        let call = self
            .registry
            .getEncryptedRecord(record_id.as_u256())
            .from(requester);
        let raw = self.bounded("getEncryptedRecord", call.call()).await?;
        Ok(EncryptedRecord {
            record_id,
            encrypted_ref: raw.encryptedRef.to_vec(),
            encrypted_meta: raw.encryptedMeta.to_vec(),
            merkle_root: raw.merkleRoot,
            timestamp: raw.timestamp.saturating_to::<u64>(),
            owner: raw.owner,
            exists: raw.exists,
        })
    }

    pub async fn get_user_access_key(
        &self,
        record_id: RecordId,
        requester: Address,
    ) -> Result<AccessKey, LedgerError> {
        let call = self.registry.getUserAccessKey(record_id.as_u256(), requester);
        let raw: B256 = self.bounded("getUserAccessKey", call.call()).await?;
        Ok(AccessKey::from_bytes(raw.0))
    }

    pub async fn record_issuer(&self, record_id: RecordId) -> Result<Option<Address>, LedgerError> {
        let call = self.registry.getRecordIssuer(record_id.as_u256());
        let issuer: Address = self.bounded("getRecordIssuer", call.call()).await?;
        Ok((issuer != Address::ZERO).then_some(issuer))
    }

    pub async fn block_number(&self) -> Result<u64, LedgerError> {
        let provider = self.registry.provider();
        match tokio::time::timeout(self.call_timeout, provider.get_block_number()).await {
            Ok(result) => result.map_err(|e| LedgerError::Rpc(e.to_string())),
            Err(_) => Err(LedgerError::Rpc("eth_blockNumber timed out".to_string())),
        }
    }
}
