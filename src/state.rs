// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Long-lived services, built once at startup and shared with every handler.

use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::credentials::CredentialStore;
use crate::ledger::{EvmLedger, LedgerClient, LocalLedger};
use crate::pipeline::AccessPipeline;
use crate::proof::{CircuitArtifacts, ConstraintProver, ProofGenerator, ProofInputBuilder, ProvingSystem};
use crate::resilience::{ErrorHistory, FallbackPolicy, RateLimiter, ResilienceLayer, RetryPolicy};
use crate::roles::RoleDirectory;
use crate::sharing::SharingTokenService;
use crate::storage::{FileStorage, StorageError, StoragePaths};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("system randomness unavailable for {0}")]
    Randomness(&'static str),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<AccessPipeline>,
    pub tokens: Arc<SharingTokenService>,
    pub storage: Arc<FileStorage>,
}

impl AppState {
    /// Build every service from `config`, loading circuit artifacts from
    /// `CIRCUIT_DIR`. Missing artifacts leave the proof path disabled.
    pub fn from_config(config: AppConfig) -> Result<Self, StateError> {
        let artifacts = match CircuitArtifacts::load(&config.circuit_dir) {
            Ok(artifacts) => Some(artifacts),
            Err(e) => {
                warn!(
                    dir = %config.circuit_dir.display(),
                    error = %e,
                    "Circuit artifacts unavailable; proof generation disabled"
                );
                None
            }
        };
        Self::with_artifacts(config, artifacts)
    }

    pub fn with_artifacts(
        config: AppConfig,
        artifacts: Option<CircuitArtifacts>,
    ) -> Result<Self, StateError> {
        let mut storage = FileStorage::new(StoragePaths::new(&config.data_dir));
        storage.initialize()?;
        let storage = Arc::new(storage);

        let credential_secret = secret_or_random(
            config.credential_master_secret.as_deref(),
            "CREDENTIAL_MASTER_SECRET",
        )?;
        let credentials = Arc::new(CredentialStore::new(credential_secret));
        let system: Arc<dyn ProvingSystem> = Arc::new(ConstraintProver);
        let artifacts = artifacts.map(Arc::new);

        let ledger = build_ledger(&config, &credentials, &system, artifacts.as_deref());
        info!(ledger = ledger.describe(), "Ledger client selected");

        let resilience = Arc::new(ResilienceLayer::new(
            RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay),
            FallbackPolicy {
                on_access_denied: config.fallback_on_access_denied,
            },
            RoleDirectory::new(config.admin_addresses.iter().copied()),
            Arc::new(ErrorHistory::default()),
            Arc::new(RateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window,
            )),
        ));

        let pipeline = Arc::new(AccessPipeline::new(
            ledger,
            Arc::new(ProofGenerator::new(system, artifacts)),
            ProofInputBuilder::new(credentials),
            resilience,
            config.gateway_url.clone(),
            config.proof_timeout,
        ));

        let signing_secret =
            secret_or_random(config.token_signing_secret.as_deref(), "TOKEN_SIGNING_SECRET")?;
        let tokens = Arc::new(SharingTokenService::new(
            signing_secret,
            config.token_max_duration_secs,
            Some(storage.clone()),
        ));

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            tokens,
            storage,
        })
    }

    /// The in-process ledger, when one is in use.
    pub fn local_ledger(&self) -> Option<&Arc<LocalLedger>> {
        match self.pipeline.ledger() {
            LedgerClient::Local(local) => Some(local),
            _ => None,
        }
    }
}

fn build_ledger(
    config: &AppConfig,
    credentials: &Arc<CredentialStore>,
    system: &Arc<dyn ProvingSystem>,
    artifacts: Option<&CircuitArtifacts>,
) -> LedgerClient {
    if config.ledger.use_local {
        return LedgerClient::Local(Arc::new(LocalLedger::new(
            credentials.clone(),
            system.clone(),
            artifacts.map(|a| a.verifying_key().clone()),
        )));
    }

    let endpoint = match config.ledger.evm_endpoint() {
        Ok(endpoint) => endpoint,
        Err(missing) => {
            warn!(missing = %missing, "Ledger is not configured");
            return LedgerClient::Unconfigured(missing);
        }
    };
    match EvmLedger::connect(
        &endpoint.rpc_url,
        endpoint.verifier,
        endpoint.registry,
        config.ledger.call_timeout,
    ) {
        Ok(ledger) => LedgerClient::Evm(Arc::new(ledger)),
        Err(e) => {
            warn!(error = %e, "Ledger client could not be built");
            LedgerClient::Unconfigured(e.to_string())
        }
    }
}

/// Configured secret bytes, or 32 random bytes for this process only.
fn secret_or_random(configured: Option<&str>, name: &'static str) -> Result<Vec<u8>, StateError> {
    if let Some(secret) = configured {
        return Ok(secret.as_bytes().to_vec());
    }
    warn!(secret = name, "Secret not configured; using a per-process random value");
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StateError::Randomness(name))?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;

    /// State backed by the local ledger with a loaded circuit and data
    /// stored under `dir`.
    pub fn local_state(dir: &Path, extra: &[(&str, &str)]) -> AppState {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("LOCAL_LEDGER".to_string(), "true".to_string()),
            ("DATA_DIR".to_string(), dir.display().to_string()),
            ("CREDENTIAL_MASTER_SECRET".to_string(), "test-master".to_string()),
            ("TOKEN_SIGNING_SECRET".to_string(), "test-signing".to_string()),
            ("RETRY_BASE_DELAY_MS".to_string(), "0".to_string()),
        ]);
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = AppConfig::from_lookup(move |k| vars.get(k).cloned()).unwrap();
        let artifacts = CircuitArtifacts::from_bytes(b"wasm", b"zkey").unwrap();
        AppState::with_artifacts(config, Some(artifacts)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn local_state_uses_local_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::local_state(dir.path(), &[]);
        assert!(state.local_ledger().is_some());
        assert!(state.pipeline.generator().is_ready());
        state.storage.health_check().unwrap();
    }

    #[test]
    fn missing_ledger_settings_leave_ledger_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let vars = HashMap::from([("DATA_DIR".to_string(), dir.path().display().to_string())]);
        let config = AppConfig::from_lookup(move |k| vars.get(k).cloned()).unwrap();
        let state = AppState::with_artifacts(config, None).unwrap();

        assert!(!state.pipeline.ledger().is_configured());
        assert!(state.local_ledger().is_none());
        assert!(!state.pipeline.generator().is_ready());
    }
}
