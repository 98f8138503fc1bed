// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compiled circuit artifacts.
//!
//! A circuit directory holds three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `access.wasm` | witness calculator |
//! | `access_final.zkey` | proving key |
//! | `verification_key.json` | verifying key descriptor |
//!
//! The descriptor pins the proving key by digest, so a directory with
//! mismatched files is rejected at load time instead of producing proofs
//! that never verify.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::PUBLIC_SIGNAL_COUNT;
use crate::zk_error::{ZkError, ZkResult};

pub const WASM_FILE: &str = "access.wasm";
pub const ZKEY_FILE: &str = "access_final.zkey";
pub const VERIFICATION_KEY_FILE: &str = "verification_key.json";

/// On-disk verifying key descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationKeyFile {
    pub protocol: String,
    pub curve: String,
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    /// Hex SHA-256 of the proving key.
    #[serde(rename = "zkeyDigest")]
    pub zkey_digest: String,
}

/// Key material used to check proofs produced from a given artifact set.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    material: [u8; 32],
    n_public: usize,
}

impl VerifyingKey {
    pub fn material(&self) -> &[u8; 32] {
        &self.material
    }

    pub fn n_public(&self) -> usize {
        self.n_public
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("n_public", &self.n_public)
            .finish_non_exhaustive()
    }
}

/// Loaded, internally consistent artifact set.
#[derive(Debug, Clone)]
pub struct CircuitArtifacts {
    zkey_digest: [u8; 32],
    verifying_key: VerifyingKey,
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn read_artifact(dir: &Path, name: &str) -> ZkResult<Vec<u8>> {
    let path = dir.join(name);
    let bytes = std::fs::read(&path).map_err(|e| {
        ZkError::CircuitNotLoaded(format!("cannot read {}: {e}", path.display()))
    })?;
    if bytes.is_empty() {
        return Err(ZkError::CircuitNotLoaded(format!("{} is empty", path.display())));
    }
    Ok(bytes)
}

impl CircuitArtifacts {
    /// Build an artifact set from in-memory witness calculator and proving key.
    pub fn from_bytes(wasm: &[u8], zkey: &[u8]) -> ZkResult<Self> {
        if wasm.is_empty() || zkey.is_empty() {
            return Err(ZkError::CircuitNotLoaded("artifact bytes are empty".to_string()));
        }
        let wasm_digest = sha256(wasm);
        let zkey_digest = sha256(zkey);

        let mut hasher = Sha256::new();
        hasher.update(b"zk-record-gateway/verifying-key/v1");
        hasher.update(wasm_digest);
        hasher.update(zkey_digest);

        Ok(Self {
            zkey_digest,
            verifying_key: VerifyingKey {
                material: hasher.finalize().into(),
                n_public: PUBLIC_SIGNAL_COUNT,
            },
        })
    }

    /// Load and cross-check the three artifact files in `dir`.
    pub fn load(dir: &Path) -> ZkResult<Self> {
        let wasm = read_artifact(dir, WASM_FILE)?;
        let zkey = read_artifact(dir, ZKEY_FILE)?;
        let vk_raw = read_artifact(dir, VERIFICATION_KEY_FILE)?;

        let descriptor: VerificationKeyFile = serde_json::from_slice(&vk_raw).map_err(|e| {
            ZkError::CircuitNotLoaded(format!("{VERIFICATION_KEY_FILE} is malformed: {e}"))
        })?;
        if descriptor.n_public != PUBLIC_SIGNAL_COUNT {
            return Err(ZkError::CircuitNotLoaded(format!(
                "circuit exposes {} public signals, expected {PUBLIC_SIGNAL_COUNT}",
                descriptor.n_public
            )));
        }

        let artifacts = Self::from_bytes(&wasm, &zkey)?;
        if !descriptor
            .zkey_digest
            .eq_ignore_ascii_case(&alloy::hex::encode(artifacts.zkey_digest))
        {
            return Err(ZkError::CircuitNotLoaded(
                "verification key does not match the proving key".to_string(),
            ));
        }

        tracing::info!(
            dir = %dir.display(),
            protocol = %descriptor.protocol,
            curve = %descriptor.curve,
            "Circuit artifacts loaded"
        );
        Ok(artifacts)
    }

    /// Descriptor matching this artifact set.
    pub fn verification_key_file(&self) -> VerificationKeyFile {
        VerificationKeyFile {
            protocol: "groth16".to_string(),
            curve: "bn128".to_string(),
            n_public: self.verifying_key.n_public,
            zkey_digest: alloy::hex::encode(self.zkey_digest),
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_set(dir: &Path, wasm: &[u8], zkey: &[u8]) -> CircuitArtifacts {
        let artifacts = CircuitArtifacts::from_bytes(wasm, zkey).unwrap();
        std::fs::write(dir.join(WASM_FILE), wasm).unwrap();
        std::fs::write(dir.join(ZKEY_FILE), zkey).unwrap();
        std::fs::write(
            dir.join(VERIFICATION_KEY_FILE),
            serde_json::to_vec(&artifacts.verification_key_file()).unwrap(),
        )
        .unwrap();
        artifacts
    }

    #[test]
    fn loads_consistent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write_set(dir.path(), b"wasm", b"zkey");
        let loaded = CircuitArtifacts::load(dir.path()).unwrap();
        assert_eq!(loaded.verifying_key(), expected.verifying_key());
    }

    #[test]
    fn missing_file_is_circuit_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let err = CircuitArtifacts::load(dir.path()).unwrap_err();
        assert!(matches!(err, ZkError::CircuitNotLoaded(_)));
    }

    #[test]
    fn empty_file_is_circuit_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), b"wasm", b"zkey");
        std::fs::write(dir.path().join(ZKEY_FILE), b"").unwrap();
        assert!(matches!(
            CircuitArtifacts::load(dir.path()),
            Err(ZkError::CircuitNotLoaded(_))
        ));
    }

    #[test]
    fn swapped_proving_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), b"wasm", b"zkey");
        std::fs::write(dir.path().join(ZKEY_FILE), b"other-zkey").unwrap();
        let err = CircuitArtifacts::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn different_artifacts_yield_different_keys() {
        let a = CircuitArtifacts::from_bytes(b"wasm", b"zkey-1").unwrap();
        let b = CircuitArtifacts::from_bytes(b"wasm", b"zkey-2").unwrap();
        assert_ne!(a.verifying_key(), b.verifying_key());
    }
}
