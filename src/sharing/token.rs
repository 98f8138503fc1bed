// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sharing-token data types and signing.

use alloy::hex;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::RecordId;
use crate::zk_error::{ZkError, ZkResult};

type HmacSha256 = Hmac<Sha256>;

const BINDING_DOMAIN: &[u8] = b"zk-record-gateway/sharing-binding/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Download,
    Share,
}

impl Permission {
    fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Download => "download",
            Permission::Share => "share",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A granted action, optionally expiring before the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub permission: Permission,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharingToken {
    pub token_id: Uuid,
    pub record_id: RecordId,
    pub owner: String,
    pub grantee: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<PermissionGrant>,
    /// Hex SHA-256 commitment to (record, owner, grantee, creation time).
    pub proof_binding_hash: String,
    /// Hex HMAC-SHA256 over the canonical fields.
    pub signature: String,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SharingToken {
    pub fn grant_for(&self, action: Permission) -> Option<&PermissionGrant> {
        self.permissions.iter().find(|g| g.permission == action)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Canonical byte string covered by the signature.
    fn canonical(&self) -> String {
        let perms = self
            .permissions
            .iter()
            .map(|g| match g.expires_at {
                Some(at) => format!("{}@{}", g.permission, at.timestamp()),
                None => g.permission.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.token_id,
            self.record_id,
            self.owner,
            self.grantee,
            self.created_at.timestamp(),
            self.expires_at.timestamp(),
            perms,
            self.proof_binding_hash,
        )
    }

    pub(crate) fn sign(&mut self, key: &[u8]) -> ZkResult<()> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| ZkError::EncryptionFailed(e.to_string()))?;
        mac.update(self.canonical().as_bytes());
        self.signature = hex::encode(mac.finalize().into_bytes());
        Ok(())
    }

    pub(crate) fn signature_valid(&self, key: &[u8]) -> bool {
        let Ok(sig) = hex::decode(&self.signature) else {
            return false;
        };
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
            return false;
        };
        mac.update(self.canonical().as_bytes());
        mac.verify_slice(&sig).is_ok()
    }
}

/// Commitment tying a token to the sharing relation it delegates.
pub fn proof_binding_hash(
    record_id: RecordId,
    owner: &str,
    grantee: &str,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(BINDING_DOMAIN);
    for part in [
        record_id.to_be_bytes().as_slice(),
        owner.as_bytes(),
        grantee.as_bytes(),
        created_at.timestamp().to_be_bytes().as_slice(),
    ] {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Identity comparison form: NFKC, trimmed, lowercase.
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().nfkc().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    pub record_id: RecordId,
    pub owner: String,
    pub grantee: String,
    pub permissions: Vec<PermissionGrant>,
    /// Requested lifetime; clamped to the service maximum.
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub token: Option<SharingToken>,
    pub error: Option<String>,
    pub remaining_secs: Option<i64>,
}

impl ValidationResult {
    pub(crate) fn invalid(error: impl Into<String>, token: Option<SharingToken>) -> Self {
        Self {
            is_valid: false,
            token,
            error: Some(error.into()),
            remaining_secs: None,
        }
    }

    pub(crate) fn valid(token: SharingToken, now: DateTime<Utc>) -> Self {
        let remaining = (token.expires_at - now).num_seconds().max(0);
        Self {
            is_valid: true,
            token: Some(token),
            error: None,
            remaining_secs: Some(remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token() -> SharingToken {
        let now = Utc::now();
        SharingToken {
            token_id: Uuid::new_v4(),
            record_id: RecordId::new(5),
            owner: "0xowner".into(),
            grantee: "0xgrantee".into(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            permissions: vec![PermissionGrant {
                permission: Permission::View,
                expires_at: None,
            }],
            proof_binding_hash: proof_binding_hash(RecordId::new(5), "0xowner", "0xgrantee", now),
            signature: String::new(),
            revoked: false,
            revoked_at: None,
        }
    }

    #[test]
    fn signature_detects_tampering() {
        let key = b"signing-key";
        let mut t = token();
        t.sign(key).unwrap();
        assert!(t.signature_valid(key));
        assert!(!t.signature_valid(b"other-key"));

        t.expires_at += Duration::days(365);
        assert!(!t.signature_valid(key));
    }

    #[test]
    fn revocation_does_not_change_signature_coverage() {
        let key = b"signing-key";
        let mut t = token();
        t.sign(key).unwrap();
        t.revoked = true;
        assert!(t.signature_valid(key));
    }

    #[test]
    fn identity_normalization_folds_case_and_width() {
        assert_eq!(normalize_identity(" 0xABcd "), "0xabcd");
        // Fullwidth "Ａ" normalizes to "a".
        assert_eq!(normalize_identity("\u{FF21}lice"), "alice");
    }

    #[test]
    fn binding_hash_depends_on_grantee() {
        let now = Utc::now();
        let a = proof_binding_hash(RecordId::new(1), "o", "g1", now);
        let b = proof_binding_hash(RecordId::new(1), "o", "g2", now);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
