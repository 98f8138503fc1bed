// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record-relative roles used by legacy fallback authorization.

use std::collections::HashSet;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::credentials::RecordParties;

/// A requester's standing toward one record.
///
/// ## Role Hierarchy
///
/// - `Admin` - Oversight role, may act on any record
/// - `Owner` - The record's owner
/// - `Issuer` - The party that issued the record
/// - `Requester` - Anyone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Issuer,
    Requester,
}

impl Role {
    /// Roles allowed to read a record without a proof while proof
    /// machinery is down.
    pub fn is_legacy_authorized(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner | Role::Issuer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Owner => write!(f, "owner"),
            Role::Issuer => write!(f, "issuer"),
            Role::Requester => write!(f, "requester"),
        }
    }
}

/// Addresses holding the admin-oversight role.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    admins: HashSet<Address>,
}

impl RoleDirectory {
    pub fn new(admins: impl IntoIterator<Item = Address>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.admins.contains(address)
    }

    /// Highest role `requester` holds for a record with `parties`.
    ///
    /// Owner wins over issuer when both apply; admin wins over both.
    pub fn role_for(&self, requester: &Address, parties: Option<&RecordParties>) -> Role {
        if self.is_admin(requester) {
            return Role::Admin;
        }
        match parties {
            Some(p) if p.owner == *requester => Role::Owner,
            Some(p) if p.issuer == *requester => Role::Issuer,
            _ => Role::Requester,
        }
    }
}
