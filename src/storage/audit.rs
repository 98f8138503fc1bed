// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for sharing-token operations.
//!
//! Every create, validate, revoke and refresh is appended to a daily JSONL
//! file under `audit/{date}/events.jsonl`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FileStorage, StorageError, StorageResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TokenCreated,
    TokenValidated,
    TokenRevoked,
    TokenRefreshed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Identity that triggered the event.
    pub actor: Option<String>,
    pub token_id: Option<String>,
    pub record_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            token_id: None,
            record_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_token(mut self, token_id: impl Into<String>, record_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

pub struct AuditRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Append an event to its day's log.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);
        let line = serde_json::to_string(event)
            .map_err(|e| StorageError::Serialization(format!("audit event: {e}")))?;
        self.storage.append_line(&path, &line)
    }

    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = String::from_utf8(self.storage.read_raw(&path)?)
            .map_err(|e| StorageError::Serialization(format!("invalid UTF-8 in audit log: {e}")))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| StorageError::Serialization(format!("audit event: {e}")))
            })
            .collect()
    }

    pub fn search_by_token(&self, token_id: &str, date: &str) -> StorageResult<Vec<AuditEvent>> {
        Ok(self
            .read_events(date)?
            .into_iter()
            .filter(|e| e.token_id.as_deref() == Some(token_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::TokenRevoked)
            .with_actor("0xabc")
            .failed("not the owner");
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("not the owner"));
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(&AuditEvent::new(AuditEventType::TokenCreated).with_token("t1", "42"))
            .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::TokenValidated).with_token("t1", "42"))
            .unwrap();

        let events = repo.read_events(&today()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::TokenCreated);
        assert_eq!(events[1].event_type, AuditEventType::TokenValidated);
    }

    #[test]
    fn search_by_token_filters() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        repo.log(&AuditEvent::new(AuditEventType::TokenCreated).with_token("t1", "1"))
            .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::TokenCreated).with_token("t2", "1"))
            .unwrap();

        let events = repo.search_by_token("t2", &today()).unwrap();
        assert_eq!(events.len(), 1);
    }
}
