// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup into
//! [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for tokens and audit logs | `./data` |
//! | `LEDGER_RPC_URL` | EVM JSON-RPC endpoint | Required for the EVM ledger |
//! | `VERIFIER_CONTRACT_ADDRESS` | Access verifier contract | Required for the EVM ledger |
//! | `RECORD_REGISTRY_ADDRESS` | Record registry contract | Required for the EVM ledger |
//! | `LEDGER_CALL_TIMEOUT_MS` | Per-call ledger timeout | `10000` |
//! | `LOCAL_LEDGER` | Use the in-process ledger (`true`/`1`) | `false` |
//! | `CIRCUIT_DIR` | Directory holding circuit artifacts | `./circuits` |
//! | `IPFS_GATEWAY_URL` | Gateway used to resolve references | `https://ipfs.io` |
//! | `ADMIN_ADDRESSES` | Comma-separated admin-oversight addresses | empty |
//! | `FALLBACK_ON_ACCESS_DENIED` | Evaluate legacy fallback after `AccessDenied` | `false` |
//! | `RATE_LIMIT_MAX_REQUESTS` | Verification requests per window | `10` |
//! | `RATE_LIMIT_WINDOW_SECS` | Rate-limit window | `60` |
//! | `RETRY_MAX_ATTEMPTS` | Attempts including the first | `3` |
//! | `RETRY_BASE_DELAY_MS` | First retry delay, doubled each retry | `200` |
//! | `PROOF_TIMEOUT_SECS` | Proof generation deadline | `30` |
//! | `TOKEN_MAX_DURATION_SECS` | Maximum sharing-token lifetime | `2592000` |
//! | `SWEEP_INTERVAL_SECS` | Background sweep interval | `60` |
//! | `CREDENTIAL_MASTER_SECRET` | Secret for access-key derivation | random per process |
//! | `TOKEN_SIGNING_SECRET` | Secret for sharing-token signatures | random per process |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Ledger settings are never defaulted. A missing one leaves the ledger
//! unconfigured and ledger-backed requests fail with
//! `CONTRACT_NOT_INITIALIZED`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use url::Url;

use crate::resilience::{rate_limit, retry};
use crate::sharing::DEFAULT_MAX_DURATION_SECS;
use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
pub const VERIFIER_CONTRACT_ENV: &str = "VERIFIER_CONTRACT_ADDRESS";
pub const RECORD_REGISTRY_ENV: &str = "RECORD_REGISTRY_ADDRESS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_CIRCUIT_DIR: &str = "./circuits";
const DEFAULT_GATEWAY: &str = "https://ipfs.io";
const DEFAULT_LEDGER_CALL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Ledger connection settings, each validated when the ledger is built.
#[derive(Debug, Clone, Default)]
pub struct LedgerSettings {
    pub rpc_url: Option<String>,
    pub verifier_address: Option<String>,
    pub registry_address: Option<String>,
    pub call_timeout: Duration,
    pub use_local: bool,
}

/// Validated EVM endpoint and contract addresses.
#[derive(Debug, Clone)]
pub struct EvmEndpoint {
    pub rpc_url: String,
    pub verifier: Address,
    pub registry: Address,
}

impl LedgerSettings {
    /// Resolve the EVM endpoint, naming the first missing or invalid
    /// setting on failure.
    pub fn evm_endpoint(&self) -> Result<EvmEndpoint, String> {
        let rpc_url = required(&self.rpc_url, LEDGER_RPC_URL_ENV)?;
        let verifier = address(required(&self.verifier_address, VERIFIER_CONTRACT_ENV)?, VERIFIER_CONTRACT_ENV)?;
        let registry = address(required(&self.registry_address, RECORD_REGISTRY_ENV)?, RECORD_REGISTRY_ENV)?;
        Ok(EvmEndpoint {
            rpc_url: rpc_url.to_string(),
            verifier,
            registry,
        })
    }
}

fn required<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| var.to_string())
}

fn address(value: &str, var: &str) -> Result<Address, String> {
    Address::from_str(value).map_err(|_| format!("{var} (not an address)"))
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub ledger: LedgerSettings,
    pub circuit_dir: PathBuf,
    pub gateway_url: Url,
    pub admin_addresses: Vec<Address>,
    pub fallback_on_access_denied: bool,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub proof_timeout: Duration,
    pub token_max_duration_secs: u64,
    pub sweep_interval: Duration,
    pub credential_master_secret: Option<String>,
    pub token_signing_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let gateway_raw = get("IPFS_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY.to_string());
        let gateway_url = Url::parse(&gateway_raw).map_err(|e| ConfigError::Invalid {
            var: "IPFS_GATEWAY_URL",
            reason: e.to_string(),
        })?;

        let admin_addresses = match get("ADMIN_ADDRESSES") {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Address::from_str(s).map_err(|_| ConfigError::Invalid {
                        var: "ADMIN_ADDRESSES",
                        reason: format!("{s} is not an address"),
                    })
                })
                .collect::<Result<_, _>>()?,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string())),
            ledger: LedgerSettings {
                rpc_url: get(LEDGER_RPC_URL_ENV),
                verifier_address: get(VERIFIER_CONTRACT_ENV),
                registry_address: get(RECORD_REGISTRY_ENV),
                call_timeout: Duration::from_millis(parse_or(
                    &get,
                    "LEDGER_CALL_TIMEOUT_MS",
                    DEFAULT_LEDGER_CALL_TIMEOUT_MS,
                )?),
                use_local: parse_flag(&get, "LOCAL_LEDGER")?,
            },
            circuit_dir: PathBuf::from(
                get("CIRCUIT_DIR").unwrap_or_else(|| DEFAULT_CIRCUIT_DIR.to_string()),
            ),
            gateway_url,
            admin_addresses,
            fallback_on_access_denied: parse_flag(&get, "FALLBACK_ON_ACCESS_DENIED")?,
            rate_limit_max_requests: parse_or(
                &get,
                "RATE_LIMIT_MAX_REQUESTS",
                rate_limit::DEFAULT_MAX_REQUESTS,
            )?,
            rate_limit_window: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                rate_limit::DEFAULT_WINDOW.as_secs(),
            )?),
            retry_max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", retry::DEFAULT_MAX_ATTEMPTS)?,
            retry_base_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_BASE_DELAY_MS",
                retry::DEFAULT_BASE_DELAY_MS,
            )?),
            proof_timeout: Duration::from_secs(parse_or(
                &get,
                "PROOF_TIMEOUT_SECS",
                DEFAULT_PROOF_TIMEOUT_SECS,
            )?),
            token_max_duration_secs: parse_or(
                &get,
                "TOKEN_MAX_DURATION_SECS",
                DEFAULT_MAX_DURATION_SECS,
            )?,
            sweep_interval: Duration::from_secs(parse_or(
                &get,
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?),
            credential_master_secret: get("CREDENTIAL_MASTER_SECRET"),
            token_signing_secret: get("TOKEN_SIGNING_SECRET"),
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match get(var).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            var,
            reason: format!("{v} is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.rate_limit_max_requests, 10);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
        assert_eq!(cfg.retry_max_attempts, 3);
        assert_eq!(cfg.token_max_duration_secs, 30 * 24 * 3600);
        assert!(!cfg.ledger.use_local);
        assert!(cfg.ledger.rpc_url.is_none());
    }

    #[test]
    fn ledger_settings_are_never_defaulted() {
        let cfg = config(&[(LEDGER_RPC_URL_ENV, "http://localhost:8545")]).unwrap();
        assert_eq!(cfg.ledger.evm_endpoint().unwrap_err(), VERIFIER_CONTRACT_ENV);
    }

    #[test]
    fn complete_ledger_settings_resolve() {
        let cfg = config(&[
            (LEDGER_RPC_URL_ENV, "http://localhost:8545"),
            (VERIFIER_CONTRACT_ENV, "0x00000000000000000000000000000000000000aa"),
            (RECORD_REGISTRY_ENV, "0x00000000000000000000000000000000000000bb"),
        ])
        .unwrap();
        let endpoint = cfg.ledger.evm_endpoint().unwrap();
        assert_eq!(endpoint.verifier, Address::with_last_byte(0xaa));
        assert_eq!(endpoint.registry, Address::with_last_byte(0xbb));
    }

    #[test]
    fn invalid_contract_address_is_named() {
        let cfg = config(&[
            (LEDGER_RPC_URL_ENV, "http://localhost:8545"),
            (VERIFIER_CONTRACT_ENV, "nope"),
            (RECORD_REGISTRY_ENV, "0x00000000000000000000000000000000000000bb"),
        ])
        .unwrap();
        assert!(cfg.ledger.evm_endpoint().unwrap_err().contains(VERIFIER_CONTRACT_ENV));
    }

    #[test]
    fn invalid_numbers_and_flags_are_rejected() {
        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("LOCAL_LEDGER", "maybe")]).is_err());
        assert!(config(&[("ADMIN_ADDRESSES", "0x1234")]).is_err());
    }

    #[test]
    fn admin_list_parses() {
        let cfg = config(&[(
            "ADMIN_ADDRESSES",
            "0x00000000000000000000000000000000000000aa, 0x00000000000000000000000000000000000000bb",
        )])
        .unwrap();
        assert_eq!(cfg.admin_addresses.len(), 2);
    }
}
