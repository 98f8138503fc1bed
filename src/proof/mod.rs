// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Zero-knowledge proof pipeline: input assembly, generation and
//! verification.

pub mod artifacts;
pub mod field;
pub mod generator;
pub mod inputs;
pub mod system;
pub mod types;
pub mod verifier;

pub use artifacts::{CircuitArtifacts, VerifyingKey};
pub use generator::ProofGenerator;
pub use inputs::{CircuitInputs, ProofInputBuilder};
pub use system::{ConstraintProver, ProvingSystem};
pub use types::{Proof, ProofPayload, PublicSignals};
pub use verifier::{ProofVerifier, VerifiedProof};
