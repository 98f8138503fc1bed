// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Legacy fallback authorization.
//!
//! When proof machinery is unavailable, a request may still succeed if the
//! requester is the record's owner, its recorded issuer, or holds the
//! admin-oversight role. Every decision carries an advisory so callers can
//! tell the response was not ZK-verified.

use alloy::primitives::Address;
use serde::Serialize;
use utoipa::ToSchema;

use crate::credentials::RecordParties;
use crate::roles::{Role, RoleDirectory};
use crate::zk_error::ZkErrorKind;

/// When fallback evaluation is considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Also evaluate fallback after an `AccessDenied`. Off by default.
    pub on_access_denied: bool,
}

impl FallbackPolicy {
    pub fn is_eligible(&self, kind: ZkErrorKind) -> bool {
        kind.signals_machinery_down() || (self.on_access_denied && kind == ZkErrorKind::AccessDenied)
    }
}

/// Result of a fallback evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FallbackDecision {
    pub has_access: bool,
    pub role: Role,
    pub advisory: String,
}

/// Decide legacy access for `requester` after a `cause` failure.
pub fn fallback_access(
    requester: &Address,
    parties: Option<&RecordParties>,
    roles: &RoleDirectory,
    cause: ZkErrorKind,
) -> FallbackDecision {
    let role = roles.role_for(requester, parties);
    if role.is_legacy_authorized() {
        FallbackDecision {
            has_access: true,
            role,
            advisory: format!(
                "Zero-knowledge verification unavailable ({cause}); access granted through legacy {role} authorization. This response was not proof-verified."
            ),
        }
    } else {
        FallbackDecision {
            has_access: false,
            role,
            advisory: format!(
                "Zero-knowledge verification unavailable ({cause}) and legacy authorization requires the record owner, issuer or an administrator."
            ),
        }
    }
}
