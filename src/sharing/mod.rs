// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Non-ZK delegated access through signed, expiring sharing tokens.

pub mod service;
pub mod token;

pub use service::{SharingTokenService, DEFAULT_MAX_DURATION_SECS};
pub use token::{
    normalize_identity, CreateTokenRequest, Permission, PermissionGrant, SharingToken,
    ValidationResult,
};
