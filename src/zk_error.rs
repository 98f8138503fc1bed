// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain error taxonomy for the access pipeline.
//!
//! Every failure in the credential, proof, vault and ledger layers is
//! expressed as a [`ZkError`]. Its [`ZkErrorKind`] is the closed,
//! machine-readable classification that the resilience layer matches on
//! and that HTTP clients receive as `error_code`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZkErrorKind {
    CircuitNotLoaded,
    ProofGenerationFailed,
    ProofVerificationFailed,
    AccessDenied,
    EncryptionFailed,
    DecryptionFailed,
    InvalidAccessKey,
    ContractNotInitialized,
    InvalidMerkleProof,
    TimestampExpired,
    NetworkError,
    RateLimitExceeded,
    InvalidInput,
    CredentialNotFound,
    NotFound,
}

impl ZkErrorKind {
    /// Machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ZkErrorKind::CircuitNotLoaded => "CIRCUIT_NOT_LOADED",
            ZkErrorKind::ProofGenerationFailed => "PROOF_GENERATION_FAILED",
            ZkErrorKind::ProofVerificationFailed => "PROOF_VERIFICATION_FAILED",
            ZkErrorKind::AccessDenied => "ACCESS_DENIED",
            ZkErrorKind::EncryptionFailed => "ENCRYPTION_FAILED",
            ZkErrorKind::DecryptionFailed => "DECRYPTION_FAILED",
            ZkErrorKind::InvalidAccessKey => "INVALID_ACCESS_KEY",
            ZkErrorKind::ContractNotInitialized => "CONTRACT_NOT_INITIALIZED",
            ZkErrorKind::InvalidMerkleProof => "INVALID_MERKLE_PROOF",
            ZkErrorKind::TimestampExpired => "TIMESTAMP_EXPIRED",
            ZkErrorKind::NetworkError => "NETWORK_ERROR",
            ZkErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ZkErrorKind::InvalidInput => "INVALID_INPUT",
            ZkErrorKind::CredentialNotFound => "CREDENTIAL_NOT_FOUND",
            ZkErrorKind::NotFound => "NOT_FOUND",
        }
    }

    /// Whether the failure stems from transient infrastructure and may
    /// succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZkErrorKind::NetworkError
                | ZkErrorKind::ProofGenerationFailed
                | ZkErrorKind::ContractNotInitialized
                | ZkErrorKind::CircuitNotLoaded
        )
    }

    /// Subset of retryable kinds the resilience layer retries on its own.
    pub fn is_auto_retryable(&self) -> bool {
        matches!(
            self,
            ZkErrorKind::NetworkError | ZkErrorKind::ContractNotInitialized
        )
    }

    /// Failures meaning the proof machinery itself is unavailable, which
    /// makes the request eligible for legacy fallback evaluation.
    pub fn signals_machinery_down(&self) -> bool {
        self.is_retryable()
    }
}

impl std::fmt::Display for ZkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Verification step at which a submitted proof was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Structure,
    Membership,
    Binding,
    Cryptographic,
}

impl std::fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStage::Structure => write!(f, "structure"),
            VerificationStage::Membership => write!(f, "membership"),
            VerificationStage::Binding => write!(f, "binding"),
            VerificationStage::Cryptographic => write!(f, "cryptographic"),
        }
    }
}

/// Pipeline error with associated context.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZkError {
    #[error("circuit artifacts not loaded: {0}")]
    CircuitNotLoaded(String),

    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("proof rejected at {stage} stage: {reason}")]
    ProofVerificationFailed {
        stage: VerificationStage,
        reason: String,
    },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid access key: {0}")]
    InvalidAccessKey(String),

    #[error("contract not initialized: {0}")]
    ContractNotInitialized(String),

    #[error("invalid merkle proof: {0}")]
    InvalidMerkleProof(String),

    #[error("proof timestamp expired: drift of {drift_secs}s exceeds {max_secs}s")]
    TimestampExpired { drift_secs: i64, max_secs: i64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("invalid circuit input `{field}`: {reason}")]
    InvalidCircuitInput { field: &'static str, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no credential for requester {requester} on record {record_id}")]
    CredentialNotFound { record_id: String, requester: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl ZkError {
    pub fn kind(&self) -> ZkErrorKind {
        match self {
            ZkError::CircuitNotLoaded(_) => ZkErrorKind::CircuitNotLoaded,
            ZkError::ProofGenerationFailed(_) => ZkErrorKind::ProofGenerationFailed,
            ZkError::ProofVerificationFailed { .. } => ZkErrorKind::ProofVerificationFailed,
            ZkError::AccessDenied(_) => ZkErrorKind::AccessDenied,
            ZkError::EncryptionFailed(_) => ZkErrorKind::EncryptionFailed,
            ZkError::DecryptionFailed(_) => ZkErrorKind::DecryptionFailed,
            ZkError::InvalidAccessKey(_) => ZkErrorKind::InvalidAccessKey,
            ZkError::ContractNotInitialized(_) => ZkErrorKind::ContractNotInitialized,
            ZkError::InvalidMerkleProof(_) => ZkErrorKind::InvalidMerkleProof,
            ZkError::TimestampExpired { .. } => ZkErrorKind::TimestampExpired,
            ZkError::Network(_) => ZkErrorKind::NetworkError,
            ZkError::RateLimitExceeded { .. } => ZkErrorKind::RateLimitExceeded,
            ZkError::InvalidCircuitInput { .. } | ZkError::InvalidInput(_) => {
                ZkErrorKind::InvalidInput
            }
            ZkError::CredentialNotFound { .. } => ZkErrorKind::CredentialNotFound,
            ZkError::NotFound(_) => ZkErrorKind::NotFound,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Wrap an arbitrary backend failure as a generation error.
    pub fn generation(cause: impl std::fmt::Display) -> Self {
        ZkError::ProofGenerationFailed(cause.to_string())
    }

    pub fn rejected(stage: VerificationStage, reason: impl Into<String>) -> Self {
        ZkError::ProofVerificationFailed {
            stage,
            reason: reason.into(),
        }
    }
}

pub type ZkResult<T> = Result<T, ZkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_matches_taxonomy() {
        assert!(ZkErrorKind::NetworkError.is_retryable());
        assert!(ZkErrorKind::ProofGenerationFailed.is_retryable());
        assert!(ZkErrorKind::ContractNotInitialized.is_retryable());
        assert!(ZkErrorKind::CircuitNotLoaded.is_retryable());

        assert!(!ZkErrorKind::AccessDenied.is_retryable());
        assert!(!ZkErrorKind::ProofVerificationFailed.is_retryable());
        assert!(!ZkErrorKind::InvalidInput.is_retryable());
        assert!(!ZkErrorKind::RateLimitExceeded.is_retryable());
    }

    #[test]
    fn auto_retry_is_subset_of_retryable() {
        let all = [
            ZkErrorKind::CircuitNotLoaded,
            ZkErrorKind::ProofGenerationFailed,
            ZkErrorKind::ProofVerificationFailed,
            ZkErrorKind::AccessDenied,
            ZkErrorKind::EncryptionFailed,
            ZkErrorKind::DecryptionFailed,
            ZkErrorKind::InvalidAccessKey,
            ZkErrorKind::ContractNotInitialized,
            ZkErrorKind::InvalidMerkleProof,
            ZkErrorKind::TimestampExpired,
            ZkErrorKind::NetworkError,
            ZkErrorKind::RateLimitExceeded,
            ZkErrorKind::InvalidInput,
            ZkErrorKind::CredentialNotFound,
            ZkErrorKind::NotFound,
        ];
        for kind in all {
            if kind.is_auto_retryable() {
                assert!(kind.is_retryable(), "{kind} auto-retried but not retryable");
            }
        }
        assert!(!ZkErrorKind::ProofGenerationFailed.is_auto_retryable());
        assert!(!ZkErrorKind::CircuitNotLoaded.is_auto_retryable());
    }

    #[test]
    fn circuit_input_errors_surface_as_invalid_input() {
        let err = ZkError::InvalidCircuitInput {
            field: "pathIndices",
            reason: "value 2 not in {0,1}".into(),
        };
        assert_eq!(err.kind(), ZkErrorKind::InvalidInput);
        assert!(err.to_string().contains("pathIndices"));
    }

    #[test]
    fn kind_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ZkErrorKind::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
        assert_eq!(ZkErrorKind::RateLimitExceeded.code(), "RATE_LIMIT_EXCEEDED");
    }
}
