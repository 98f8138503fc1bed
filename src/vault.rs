// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Reference Vault
//!
//! Seals a record's protected content reference under a requester's access
//! key, and opens it again at read time.
//!
//! ## Format
//!
//! ```text
//! version (1) || nonce (12) || AES-256-GCM ciphertext || tag (16)
//! ```
//!
//! The AEAD key is `HMAC-SHA256(accessKey, "zk-record-gateway/reference-key/v1")`.
//! A fresh random nonce is drawn for every seal, so sealing the same
//! reference twice yields different bytes. Opening with any other key fails
//! the tag check.
//!
//! Opened references must parse as an IPFS content identifier before they
//! are handed back to callers.

use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use url::Url;

use crate::models::AccessKey;
use crate::zk_error::{ZkError, ZkResult};

type HmacSha256 = Hmac<Sha256>;

const FORMAT_VERSION: u8 = 1;
const TAG_LEN: usize = 16;
const KEY_LABEL: &[u8] = b"zk-record-gateway/reference-key/v1";
const AAD: &[u8] = b"zk-record-gateway/reference/v1";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A validated IPFS content identifier (CID v0 or base32 CID v1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentReference(String);

impl ContentReference {
    /// Parse a bare CID or an `ipfs://` URI.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let cid = trimmed.strip_prefix("ipfs://").unwrap_or(trimmed);

        let v0 = cid.len() == 46
            && cid.starts_with("Qm")
            && cid.chars().all(|c| BASE58_ALPHABET.contains(c));
        let v1 = (59..=128).contains(&cid.len())
            && cid.starts_with('b')
            && cid
                .chars()
                .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c));

        (v0 || v1).then(|| ContentReference(cid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against an HTTP gateway: `{gateway}/ipfs/{cid}`.
    pub fn gateway_url(&self, gateway: &Url) -> ZkResult<Url> {
        let base = gateway.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/ipfs/{}", self.0))
            .map_err(|e| ZkError::InvalidInput(format!("cannot build gateway URL: {e}")))
    }
}

impl std::fmt::Display for ContentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seals and opens content references.
pub struct EncryptedReferenceVault {
    rng: SystemRandom,
}

impl Default for EncryptedReferenceVault {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptedReferenceVault {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn cipher(access_key: &AccessKey, failure: fn(String) -> ZkError) -> ZkResult<LessSafeKey> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(access_key.as_bytes())
            .map_err(|e| failure(e.to_string()))?;
        mac.update(KEY_LABEL);
        let derived = mac.finalize().into_bytes();
        let unbound = UnboundKey::new(&AES_256_GCM, &derived)
            .map_err(|_| failure("cannot initialise cipher".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn encrypt(&self, reference: &str, access_key: &AccessKey) -> ZkResult<Vec<u8>> {
        let key = Self::cipher(access_key, ZkError::EncryptionFailed)?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| ZkError::EncryptionFailed("system randomness unavailable".to_string()))?;

        let mut in_out = reference.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(AAD),
            &mut in_out,
        )
        .map_err(|_| ZkError::EncryptionFailed("seal failed".to_string()))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    pub fn decrypt(&self, cipher_bytes: &[u8], access_key: &AccessKey) -> ZkResult<String> {
        if cipher_bytes.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(ZkError::DecryptionFailed("ciphertext too short".to_string()));
        }
        if cipher_bytes[0] != FORMAT_VERSION {
            return Err(ZkError::DecryptionFailed(format!(
                "unsupported format version {}",
                cipher_bytes[0]
            )));
        }
        let nonce = Nonce::try_assume_unique_for_key(&cipher_bytes[1..1 + NONCE_LEN])
            .map_err(|_| ZkError::DecryptionFailed("malformed nonce".to_string()))?;

        let key = Self::cipher(access_key, ZkError::DecryptionFailed)?;
        let mut buf = cipher_bytes[1 + NONCE_LEN..].to_vec();
        let plain = key
            .open_in_place(nonce, Aad::from(AAD), &mut buf)
            .map_err(|_| ZkError::DecryptionFailed("authentication tag mismatch".to_string()))?;

        String::from_utf8(plain.to_vec())
            .map_err(|_| ZkError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }

    /// Decrypt and require the plaintext to be a content identifier.
    pub fn open_reference(
        &self,
        cipher_bytes: &[u8],
        access_key: &AccessKey,
    ) -> ZkResult<ContentReference> {
        let plain = self.decrypt(cipher_bytes, access_key)?;
        ContentReference::parse(&plain).ok_or_else(|| {
            ZkError::DecryptionFailed("decrypted reference is not a content identifier".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CID_V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_V1: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn key(byte: u8) -> AccessKey {
        AccessKey::from_bytes([byte; 32])
    }

    #[test]
    fn seal_then_open_returns_reference() {
        let vault = EncryptedReferenceVault::new();
        let sealed = vault.encrypt(CID_V0, &key(1)).unwrap();
        let opened = vault.open_reference(&sealed, &key(1)).unwrap();
        assert_eq!(opened.as_str(), CID_V0);
    }

    #[test]
    fn sealing_is_randomized() {
        let vault = EncryptedReferenceVault::new();
        let a = vault.encrypt(CID_V0, &key(1)).unwrap();
        let b = vault.encrypt(CID_V0, &key(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_tag_check() {
        let vault = EncryptedReferenceVault::new();
        let sealed = vault.encrypt(CID_V0, &key(1)).unwrap();
        let err = vault.decrypt(&sealed, &key(2)).unwrap_err();
        assert!(matches!(err, ZkError::DecryptionFailed(_)));
    }

    #[test]
    fn truncated_and_tampered_inputs_fail() {
        let vault = EncryptedReferenceVault::new();
        assert!(vault.decrypt(&[1, 2, 3], &key(1)).is_err());

        let mut sealed = vault.encrypt(CID_V0, &key(1)).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(vault.decrypt(&sealed, &key(1)).is_err());
    }

    #[test]
    fn non_cid_plaintext_is_not_trusted() {
        let vault = EncryptedReferenceVault::new();
        let sealed = vault.encrypt("https://evil.example/doc", &key(1)).unwrap();
        assert!(matches!(
            vault.open_reference(&sealed, &key(1)),
            Err(ZkError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn cid_formats() {
        assert!(ContentReference::parse(CID_V0).is_some());
        assert!(ContentReference::parse(CID_V1).is_some());
        assert!(ContentReference::parse(&format!("ipfs://{CID_V0}")).is_some());
        assert!(ContentReference::parse("Qm123").is_none());
        assert!(ContentReference::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbd0").is_none());
        assert!(ContentReference::parse("").is_none());
    }

    #[test]
    fn gateway_url_joins_cleanly() {
        let cid = ContentReference::parse(CID_V0).unwrap();
        let gateway = Url::parse("https://ipfs.io/").unwrap();
        assert_eq!(
            cid.gateway_url(&gateway).unwrap().as_str(),
            format!("https://ipfs.io/ipfs/{CID_V0}")
        );
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(reference in ".{0,200}", byte in any::<u8>()) {
            let vault = EncryptedReferenceVault::new();
            let k = key(byte);
            let sealed = vault.encrypt(&reference, &k).unwrap();
            prop_assert_eq!(vault.decrypt(&sealed, &k).unwrap(), reference);
        }
    }
}
