// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout under the data directory.

use std::path::{Path, PathBuf};

/// Default data directory when `DATA_DIR` is unset.
pub const DATA_ROOT: &str = "./data";

#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Sharing Token Paths ==========

    pub fn tokens_dir(&self) -> PathBuf {
        self.root.join("tokens")
    }

    pub fn token(&self, token_id: &str) -> PathBuf {
        self.tokens_dir().join(format!("{token_id}.json"))
    }

    // ========== Audit Log Paths ==========

    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Daily audit events file (JSONL).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
