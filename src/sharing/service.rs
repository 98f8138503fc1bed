// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sharing Token Service
//!
//! Time-limited, revocable delegation of record permissions, independent of
//! the proof path. Tokens live in memory behind a mutex and are snapshotted
//! to `tokens/{id}.json` when storage is attached, so they survive restarts.
//!
//! ## Validation Order
//!
//! 1. Token exists and its signature verifies
//! 2. Not revoked
//! 3. Not expired
//! 4. Requester matches the grantee (NFKC, case-insensitive)
//! 5. Action is granted and its own expiry has not passed

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use super::token::{
    normalize_identity, proof_binding_hash, CreateTokenRequest, Permission, SharingToken,
    ValidationResult,
};
use crate::storage::{AuditEvent, AuditEventType, AuditRepository, FileStorage, StorageError};
use crate::zk_error::{ZkError, ZkResult};

/// Default maximum token lifetime: 30 days.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

pub struct SharingTokenService {
    tokens: Mutex<HashMap<Uuid, SharingToken>>,
    signing_key: Vec<u8>,
    max_duration: Duration,
    storage: Option<Arc<FileStorage>>,
}

impl SharingTokenService {
    pub fn new(
        signing_key: impl Into<Vec<u8>>,
        max_duration_secs: u64,
        storage: Option<Arc<FileStorage>>,
    ) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            signing_key: signing_key.into(),
            max_duration: secs(max_duration_secs),
            storage,
        }
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SharingToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load persisted snapshots. Tokens whose signature does not verify
    /// under the current key are skipped.
    pub fn load(&self) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };
        let ids = match storage.list_files(storage.paths().tokens_dir(), "json") {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list persisted sharing tokens");
                return 0;
            }
        };

        let mut tokens = self.lock();
        let mut loaded = 0;
        for id in ids {
            match storage.read_json::<SharingToken>(storage.paths().token(&id)) {
                Ok(token) if token.signature_valid(&self.signing_key) => {
                    tokens.insert(token.token_id, token);
                    loaded += 1;
                }
                Ok(_) => tracing::warn!(token_id = %id, "Skipping sharing token with bad signature"),
                Err(e) => tracing::warn!(token_id = %id, error = %e, "Failed to read sharing token"),
            }
        }
        tracing::info!(count = loaded, "Loaded sharing tokens");
        loaded
    }

    pub fn get(&self, token_id: &Uuid) -> Option<SharingToken> {
        self.lock().get(token_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========== Operations ==========

    pub fn create(&self, request: CreateTokenRequest) -> ZkResult<SharingToken> {
        self.create_at(request, Utc::now())
    }

    pub fn create_at(
        &self,
        request: CreateTokenRequest,
        now: DateTime<Utc>,
    ) -> ZkResult<SharingToken> {
        let owner = normalize_identity(&request.owner);
        let grantee = normalize_identity(&request.grantee);
        if owner.is_empty() || grantee.is_empty() {
            return Err(ZkError::InvalidInput("owner and grantee are required".to_string()));
        }
        if owner == grantee {
            return Err(ZkError::InvalidInput("cannot share a record with its owner".to_string()));
        }
        if request.permissions.is_empty() {
            return Err(ZkError::InvalidInput("at least one permission is required".to_string()));
        }
        if request.duration_secs == 0 {
            return Err(ZkError::InvalidInput("duration must be positive".to_string()));
        }

        let expires_at = now + secs(request.duration_secs).min(self.max_duration);
        let mut permissions = request.permissions;
        for grant in &mut permissions {
            grant.expires_at = grant.expires_at.map(|at| at.min(expires_at));
        }

        let mut token = SharingToken {
            token_id: Uuid::new_v4(),
            record_id: request.record_id,
            proof_binding_hash: proof_binding_hash(request.record_id, &owner, &grantee, now),
            owner,
            grantee,
            created_at: now,
            expires_at,
            permissions,
            signature: String::new(),
            revoked: false,
            revoked_at: None,
        };
        token.sign(&self.signing_key)?;

        {
            let mut tokens = self.lock();
            self.persist(&token);
            tokens.insert(token.token_id, token.clone());
        }

        tracing::info!(
            token_id = %token.token_id,
            record_id = %token.record_id,
            expires_at = %token.expires_at,
            "Sharing token created"
        );
        self.audit(
            AuditEvent::new(AuditEventType::TokenCreated)
                .with_actor(&token.owner)
                .with_token(token.token_id.to_string(), token.record_id.to_string())
                .with_details(json!({
                    "grantee": token.grantee,
                    "expires_at": token.expires_at,
                    "requested_secs": request.duration_secs,
                })),
        );
        Ok(token)
    }

    pub fn validate(&self, token_id: &Uuid, requester: &str, action: Permission) -> ValidationResult {
        self.validate_at(token_id, requester, action, Utc::now())
    }

    pub fn validate_at(
        &self,
        token_id: &Uuid,
        requester: &str,
        action: Permission,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let result = self.check(token_id, requester, action, now);

        let mut event = AuditEvent::new(AuditEventType::TokenValidated)
            .with_actor(normalize_identity(requester))
            .with_details(json!({ "action": action }));
        if let Some(token) = &result.token {
            event = event.with_token(token.token_id.to_string(), token.record_id.to_string());
        }
        if let Some(error) = &result.error {
            event = event.failed(error);
        }
        self.audit(event);
        result
    }

    fn check(
        &self,
        token_id: &Uuid,
        requester: &str,
        action: Permission,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let Some(token) = self.get(token_id) else {
            return ValidationResult::invalid("token not found", None);
        };
        if !token.signature_valid(&self.signing_key) {
            return ValidationResult::invalid("token signature is invalid", None);
        }
        if token.revoked {
            return ValidationResult::invalid("token has been revoked", Some(token));
        }
        if token.is_expired_at(now) {
            return ValidationResult::invalid("token has expired", Some(token));
        }
        if normalize_identity(requester) != token.grantee {
            return ValidationResult::invalid("requester is not the token grantee", None);
        }
        match token.grant_for(action) {
            None => ValidationResult::invalid(format!("permission '{action}' not granted"), Some(token)),
            Some(grant) if grant.expires_at.is_some_and(|at| now >= at) => ValidationResult::invalid(
                format!("permission '{action}' has expired"),
                Some(token),
            ),
            Some(_) => ValidationResult::valid(token, now),
        }
    }

    /// Revoke a token. Returns `false` when it was already revoked.
    pub fn revoke(&self, token_id: &Uuid, revoker: &str) -> ZkResult<bool> {
        let revoker = normalize_identity(revoker);
        let now = Utc::now();

        // Snapshot written under the lock so a concurrent refresh cannot
        // overwrite the revoked state on disk.
        let outcome = {
            let mut tokens = self.lock();
            match tokens.get_mut(token_id) {
                None => Err(ZkError::NotFound(format!("sharing token {token_id}"))),
                Some(token) if token.owner != revoker => Err(ZkError::AccessDenied(
                    "only the owner may revoke a token".to_string(),
                )),
                Some(token) if token.revoked => Ok((false, token.record_id)),
                Some(token) => {
                    token.revoked = true;
                    token.revoked_at = Some(now);
                    self.persist(token);
                    Ok((true, token.record_id))
                }
            }
        };

        let event = AuditEvent::new(AuditEventType::TokenRevoked).with_actor(&revoker);
        match outcome {
            Ok((changed, record_id)) => {
                if changed {
                    tracing::info!(token_id = %token_id, "Sharing token revoked");
                }
                self.audit(
                    event
                        .with_token(token_id.to_string(), record_id.to_string())
                        .with_details(json!({ "token_id": token_id, "changed": changed })),
                );
                Ok(changed)
            }
            Err(e) => {
                self.audit(
                    event
                        .with_details(json!({ "token_id": token_id }))
                        .failed(e.to_string()),
                );
                Err(e)
            }
        }
    }

    pub fn refresh(&self, token_id: &Uuid, requester: &str, extra_secs: u64) -> ZkResult<SharingToken> {
        self.refresh_at(token_id, requester, extra_secs, Utc::now())
    }

    /// Extend a live token. The new expiry never exceeds `created_at` plus
    /// the maximum lifetime, however often the token is refreshed.
    pub fn refresh_at(
        &self,
        token_id: &Uuid,
        requester: &str,
        extra_secs: u64,
        now: DateTime<Utc>,
    ) -> ZkResult<SharingToken> {
        let requester = normalize_identity(requester);

        let outcome = {
            let mut tokens = self.lock();
            match tokens.get_mut(token_id) {
                None => Err(ZkError::NotFound(format!("sharing token {token_id}"))),
                Some(token) if token.owner != requester => Err(ZkError::AccessDenied(
                    "only the owner may refresh a token".to_string(),
                )),
                Some(token) if token.revoked => Err(ZkError::InvalidInput(
                    "a revoked token cannot be refreshed".to_string(),
                )),
                Some(token) => {
                    let base = token.expires_at.max(now);
                    let ceiling = token.created_at + self.max_duration;
                    token.expires_at = (base + secs(extra_secs)).min(ceiling);
                    token.sign(&self.signing_key).map(|()| {
                        self.persist(token);
                        token.clone()
                    })
                }
            }
        };

        let event = AuditEvent::new(AuditEventType::TokenRefreshed)
            .with_actor(&requester)
            .with_details(json!({ "token_id": token_id, "extra_secs": extra_secs }));
        match outcome {
            Ok(token) => {
                tracing::info!(token_id = %token_id, expires_at = %token.expires_at, "Sharing token refreshed");
                self.audit(event.with_token(token.token_id.to_string(), token.record_id.to_string()));
                Ok(token)
            }
            Err(e) => {
                self.audit(event.failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Audit events recorded for a token on `date` (`YYYY-MM-DD`). Owner only.
    pub fn audit_trail(
        &self,
        token_id: &Uuid,
        requester: &str,
        date: &str,
    ) -> ZkResult<Vec<AuditEvent>> {
        let requester = normalize_identity(requester);
        match self.lock().get(token_id) {
            None => return Err(ZkError::NotFound(format!("sharing token {token_id}"))),
            Some(token) if token.owner != requester => {
                return Err(ZkError::AccessDenied(
                    "only the owner may read a token's audit trail".to_string(),
                ))
            }
            Some(_) => {}
        }
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(ZkError::InvalidInput("date must be YYYY-MM-DD".to_string()));
        }

        let Some(storage) = &self.storage else {
            return Ok(Vec::new());
        };
        match AuditRepository::new(storage).search_by_token(&token_id.to_string(), date) {
            Ok(events) => Ok(events),
            Err(StorageError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(token_id = %token_id, date, error = %e, "Failed to read audit log");
                Err(ZkError::NotFound(format!("audit log for {date}")))
            }
        }
    }

    /// Drop expired tokens from memory and disk. Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.lock();
        let expired: Vec<Uuid> = tokens
            .values()
            .filter(|t| t.is_expired_at(now))
            .map(|t| t.token_id)
            .collect();
        for id in &expired {
            tokens.remove(id);
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.delete(storage.paths().token(&id.to_string())) {
                    tracing::debug!(token_id = %id, error = %e, "Expired token snapshot not removed");
                }
            }
        }
        expired.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    // ========== Persistence ==========

    /// Callers hold the token lock so snapshots land in mutation order.
    fn persist(&self, token: &SharingToken) {
        if let Some(storage) = &self.storage {
            let path = storage.paths().token(&token.token_id.to_string());
            if let Err(e) = storage.write_json(&path, token) {
                tracing::warn!(token_id = %token.token_id, error = %e, "Failed to persist sharing token");
            }
        }
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(storage) = &self.storage {
            if let Err(e) = AuditRepository::new(storage).log(&event) {
                tracing::warn!(event_type = ?event.event_type, error = %e, "Failed to write audit event");
            }
        }
    }
}

/// Longest span accepted anywhere in token arithmetic (100 years).
const MAX_SPAN_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_SPAN_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use crate::sharing::token::PermissionGrant;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    const OWNER: &str = "0xOwner";
    const GRANTEE: &str = "0xGrantee";

    fn service() -> SharingTokenService {
        SharingTokenService::new(b"test-signing-key".to_vec(), DEFAULT_MAX_DURATION_SECS, None)
    }

    fn request(duration_secs: u64) -> CreateTokenRequest {
        CreateTokenRequest {
            record_id: RecordId::new(9),
            owner: OWNER.into(),
            grantee: GRANTEE.into(),
            permissions: vec![
                PermissionGrant {
                    permission: Permission::View,
                    expires_at: None,
                },
                PermissionGrant {
                    permission: Permission::Download,
                    expires_at: None,
                },
            ],
            duration_secs,
        }
    }

    #[test]
    fn duration_is_clamped_to_maximum() {
        let svc = service();
        let now = Utc::now();
        let token = svc.create_at(request(DEFAULT_MAX_DURATION_SECS * 4), now).unwrap();
        assert_eq!(token.expires_at, now + svc.max_duration());
    }

    #[test]
    fn valid_token_grants_action_case_insensitively() {
        let svc = service();
        let token = svc.create(request(3600)).unwrap();
        let result = svc.validate(&token.token_id, "0xGRANTEE", Permission::View);
        assert!(result.is_valid, "{:?}", result.error);
        assert!(result.remaining_secs.unwrap() > 0);
    }

    #[test]
    fn revoked_token_is_invalid_for_any_action() {
        let svc = service();
        let token = svc.create(request(3600)).unwrap();
        assert!(svc.revoke(&token.token_id, OWNER).unwrap());

        for action in [Permission::View, Permission::Download, Permission::Share] {
            let result = svc.validate(&token.token_id, GRANTEE, action);
            assert!(!result.is_valid);
            assert!(result.error.unwrap().contains("revoked"));
        }
    }

    #[test]
    fn expired_token_is_invalid() {
        let svc = service();
        let now = Utc::now();
        let token = svc.create_at(request(60), now).unwrap();
        let later = now + Duration::seconds(61);
        let result = svc.validate_at(&token.token_id, GRANTEE, Permission::View, later);
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("expired"));
    }

    #[test]
    fn wrong_grantee_and_missing_permission_are_rejected() {
        let svc = service();
        let token = svc.create(request(3600)).unwrap();

        let other = svc.validate(&token.token_id, "0xsomeone", Permission::View);
        assert!(!other.is_valid);

        let share = svc.validate(&token.token_id, GRANTEE, Permission::Share);
        assert!(!share.is_valid);
        assert!(share.error.unwrap().contains("not granted"));
    }

    #[test]
    fn narrower_permission_expiry_applies() {
        let svc = service();
        let now = Utc::now();
        let mut req = request(3600);
        req.permissions[1].expires_at = Some(now + Duration::seconds(10));
        let token = svc.create_at(req, now).unwrap();

        let later = now + Duration::seconds(20);
        assert!(svc.validate_at(&token.token_id, GRANTEE, Permission::View, later).is_valid);
        assert!(!svc.validate_at(&token.token_id, GRANTEE, Permission::Download, later).is_valid);
    }

    #[test]
    fn unknown_token_is_invalid() {
        let result = service().validate(&Uuid::new_v4(), GRANTEE, Permission::View);
        assert!(!result.is_valid);
        assert!(result.token.is_none());
    }

    #[test]
    fn only_owner_may_revoke_or_refresh() {
        let svc = service();
        let token = svc.create(request(3600)).unwrap();
        assert!(matches!(
            svc.revoke(&token.token_id, GRANTEE),
            Err(ZkError::AccessDenied(_))
        ));
        assert!(matches!(
            svc.refresh(&token.token_id, GRANTEE, 60),
            Err(ZkError::AccessDenied(_))
        ));
        assert!(matches!(
            svc.revoke(&Uuid::new_v4(), OWNER),
            Err(ZkError::NotFound(_))
        ));
    }

    #[test]
    fn second_revoke_reports_no_change() {
        let svc = service();
        let token = svc.create(request(3600)).unwrap();
        assert!(svc.revoke(&token.token_id, OWNER).unwrap());
        assert!(!svc.revoke(&token.token_id, OWNER).unwrap());
    }

    #[test]
    fn refresh_extends_within_maximum() {
        let svc = service();
        let now = Utc::now();
        let token = svc.create_at(request(3600), now).unwrap();

        let refreshed = svc.refresh_at(&token.token_id, OWNER, 600, now).unwrap();
        assert_eq!(refreshed.expires_at, now + Duration::seconds(4200));

        let capped = svc
            .refresh_at(&token.token_id, OWNER, DEFAULT_MAX_DURATION_SECS * 2, now)
            .unwrap();
        assert_eq!(capped.expires_at, now + svc.max_duration());
        assert!(svc.validate(&token.token_id, GRANTEE, Permission::View).is_valid);
    }

    #[test]
    fn repeated_refresh_cannot_outlive_creation_cap() {
        let svc = service();
        let created = Utc::now();
        let token = svc.create_at(request(3600), created).unwrap();
        let ceiling = created + svc.max_duration();

        let mut now = created;
        for _ in 0..5 {
            now += Duration::days(20);
            let refreshed = svc
                .refresh_at(&token.token_id, OWNER, DEFAULT_MAX_DURATION_SECS, now)
                .unwrap();
            assert!(refreshed.expires_at <= ceiling);
        }
        assert_eq!(svc.get(&token.token_id).unwrap().expires_at, ceiling);
    }

    #[test]
    fn revoke_audit_keeps_token_and_change_details() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let storage = Arc::new(storage);

        let svc = SharingTokenService::new(b"k".to_vec(), 3600, Some(storage.clone()));
        let token = svc.create(request(600)).unwrap();
        svc.revoke(&token.token_id, OWNER).unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&storage)
            .search_by_token(&token.token_id.to_string(), &today)
            .unwrap();
        let revoked = events
            .iter()
            .find(|e| e.event_type == AuditEventType::TokenRevoked)
            .unwrap();
        let details = revoked.details.as_ref().unwrap();
        assert_eq!(details["changed"], true);
        assert_eq!(details["token_id"], token.token_id.to_string());
    }

    #[test]
    fn revoked_snapshot_survives_concurrent_refreshes() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let storage = Arc::new(storage);

        let svc = Arc::new(SharingTokenService::new(b"k".to_vec(), 3600, Some(storage.clone())));
        let token = svc.create(request(600)).unwrap();
        let id = token.token_id;

        let refreshers: Vec<_> = (0..4)
            .map(|_| {
                let svc = svc.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _ = svc.refresh(&id, OWNER, 1);
                    }
                })
            })
            .collect();
        assert!(svc.revoke(&id, OWNER).unwrap());
        for handle in refreshers {
            handle.join().unwrap();
        }

        let reloaded = SharingTokenService::new(b"k".to_vec(), 3600, Some(storage));
        assert_eq!(reloaded.load(), 1);
        assert!(reloaded.get(&id).unwrap().revoked);
    }

    #[test]
    fn audit_trail_is_owner_only() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();

        let svc = SharingTokenService::new(b"k".to_vec(), 3600, Some(Arc::new(storage)));
        let token = svc.create(request(600)).unwrap();
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let events = svc.audit_trail(&token.token_id, "0XOWNER", &today).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::TokenCreated);

        assert!(svc
            .audit_trail(&token.token_id, OWNER, "2000-01-01")
            .unwrap()
            .is_empty());
        assert!(matches!(
            svc.audit_trail(&token.token_id, GRANTEE, &today),
            Err(ZkError::AccessDenied(_))
        ));
        assert!(matches!(
            svc.audit_trail(&token.token_id, OWNER, "../tokens"),
            Err(ZkError::InvalidInput(_))
        ));
    }

    #[test]
    fn sweep_removes_expired_tokens() {
        let svc = service();
        let now = Utc::now();
        svc.create_at(request(60), now).unwrap();
        svc.create_at(request(3600), now).unwrap();
        assert_eq!(svc.sweep_at(now + Duration::seconds(120)), 1);
        assert_eq!(svc.len(), 1);
    }

    #[test]
    fn operations_are_audited_and_tokens_reload() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        let storage = Arc::new(storage);

        let svc = SharingTokenService::new(b"k".to_vec(), 3600, Some(storage.clone()));
        let token = svc.create(request(600)).unwrap();
        svc.validate(&token.token_id, GRANTEE, Permission::View);
        svc.refresh(&token.token_id, OWNER, 60).unwrap();
        svc.revoke(&token.token_id, OWNER).unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&storage)
            .search_by_token(&token.token_id.to_string(), &today)
            .unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventType::TokenCreated,
                AuditEventType::TokenValidated,
                AuditEventType::TokenRefreshed,
                AuditEventType::TokenRevoked,
            ]
        );

        let reloaded = SharingTokenService::new(b"k".to_vec(), 3600, Some(storage));
        assert_eq!(reloaded.load(), 1);
        assert!(reloaded.get(&token.token_id).unwrap().revoked);
    }
}
