// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Core Identifiers
//!
//! Newtypes shared across the credential, proof, vault and ledger layers.
//!
//! - [`RecordId`] wraps the on-chain `uint256` record identifier.
//! - [`AccessKey`] wraps the 32-byte per-(record, requester) secret. Its
//!   `Debug` output is redacted so keys never reach logs.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::proof::field::{parse_numeric, FIELD_MODULUS};
use crate::zk_error::ZkError;

// =============================================================================
// Record Identifier
// =============================================================================

/// On-chain record identifier.
///
/// Rendered and parsed as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[schema(value_type = String, example = "42")]
pub struct RecordId(pub U256);

impl RecordId {
    pub fn new(value: u64) -> Self {
        RecordId(U256::from(value))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ZkError;

    /// Accepts decimal digits only; path ids like `abc` or `0x10` are
    /// rejected so that `/records/{id}` has one canonical form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ZkError::InvalidInput(format!(
                "record id must be numeric, got `{}`",
                s.chars().take(32).collect::<String>()
            )));
        }
        U256::from_str_radix(s, 10)
            .map(RecordId)
            .map_err(|_| ZkError::InvalidInput("record id out of range".to_string()))
    }
}

impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_numeric(&raw)
            .map(RecordId)
            .ok_or_else(|| serde::de::Error::custom("record id must be a numeric string"))
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId::new(value)
    }
}

// =============================================================================
// Access Key
// =============================================================================

/// Secret binding one requester to one record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessKey([u8; 32]);

impl AccessKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        AccessKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// All-zero keys are what an unauthorized `getUserAccessKey` returns.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Field-element form used as a private circuit input.
    pub fn to_field(&self) -> U256 {
        U256::from_be_bytes(self.0) % FIELD_MODULUS
    }

    /// `0x`-prefixed hex rendering; only ever handed to the key's owner.
    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.0))
    }

    pub fn from_hex(value: &str) -> Result<Self, ZkError> {
        let raw = value.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = alloy::hex::decode(raw)
            .map_err(|_| ZkError::InvalidAccessKey("access key is not valid hex".to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ZkError::InvalidAccessKey("access key must be 32 bytes".to_string()))?;
        Ok(AccessKey(bytes))
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &AccessKey) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessKey(<redacted>)")
    }
}

// =============================================================================
// Address helpers
// =============================================================================

/// Parse a `0x`-prefixed 20-byte EVM address.
pub fn parse_address(value: &str) -> Result<Address, ZkError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ZkError::InvalidInput("requester address is required".to_string()));
    }
    Address::from_str(trimmed)
        .map_err(|_| ZkError::InvalidInput("requester address is not a valid address".to_string()))
}
