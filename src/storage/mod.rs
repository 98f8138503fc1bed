// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state on the local filesystem under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   tokens/
//!     {token_id}.json        # Sharing-token snapshot
//!   audit/
//!     {date}/events.jsonl    # Daily audit logs
//! ```
//!
//! Access keys and decrypted references are never written here.

pub mod audit;
pub mod fs;
pub mod paths;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use fs::{FileStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
