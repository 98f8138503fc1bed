// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ZK Record Gateway - Proof-Gated Access to Encrypted Records
//!
//! Releases a record's content reference only to requesters who prove, in
//! zero knowledge, that their access key belongs to the record's current
//! authorized set. When the proof machinery is down, owners, issuers and
//! admins may still get in through a clearly flagged legacy path.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `credentials` - Access keys and per-record Merkle membership
//! - `proof` - Circuit artifacts, proof generation and verification
//! - `ledger` - EVM access contract and the in-process development ledger
//! - `vault` - Sealing of content references under access keys
//! - `resilience` - Retry, fallback, rate limiting and error history
//! - `pipeline` - End-to-end record access
//! - `sharing` - Signed, expiring sharing tokens
//! - `storage` - File-backed token snapshots and audit logs

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod proof;
pub mod resilience;
pub mod roles;
pub mod sharing;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod vault;
pub mod zk_error;
