// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BN254 scalar field helpers.
//!
//! Every value that crosses into the circuit (tree nodes, identities,
//! commitments, proof coordinates) is an element of the BN254 scalar field,
//! rendered on the wire as a decimal string.

use alloy::primitives::{Address, U256};
use sha2::{Digest, Sha256};

/// BN254 scalar field modulus
/// `0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001`.
pub const FIELD_MODULUS: U256 = U256::from_limbs([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

/// Domain separation tags for field hashing.
pub mod domain {
    pub const LEAF: u8 = 0x00;
    pub const NODE: u8 = 0x01;
    pub const IDENTITY: u8 = 0x02;
    pub const RECORD_COMMITMENT: u8 = 0x03;
    pub const PROOF_A: u8 = 0x10;
    pub const PROOF_B: u8 = 0x11;
    pub const PROOF_C: u8 = 0x12;
}

/// SHA-256 over `tag || parts...`, reduced into the scalar field.
pub fn hash_to_field(tag: u8, parts: &[&[u8]]) -> U256 {
    let mut hasher = Sha256::new();
    hasher.update([tag]);
    for part in parts {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    let digest: [u8; 32] = hasher.finalize().into();
    U256::from_be_bytes(digest) % FIELD_MODULUS
}

/// Hash two field elements into their parent node.
pub fn hash_node(left: U256, right: U256) -> U256 {
    hash_to_field(
        domain::NODE,
        &[&left.to_be_bytes::<32>(), &right.to_be_bytes::<32>()],
    )
}

/// Public identity commitment of a requester (public signal 1).
pub fn requester_identity(requester: &Address) -> U256 {
    hash_to_field(domain::IDENTITY, &[requester.as_slice()])
}

/// Parse a decimal or `0x`-prefixed hexadecimal numeric string.
pub fn parse_numeric(value: &str) -> Option<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => U256::from_str_radix(trimmed, 10).ok(),
    }
}

/// Parse a numeric string that must also be a canonical field element.
pub fn parse_field_element(value: &str) -> Option<U256> {
    parse_numeric(value).filter(|v| *v < FIELD_MODULUS)
}
