// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::resilience::ErrorStats;
use crate::state::AppState;

/// Gateway status: ledger, circuit, storage and recent failures.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ok", or "degraded" when any dependency is missing.
    pub status: String,
    /// Per-dependency results.
    pub checks: HealthChecks,
    /// Failures recorded by the resilience layer.
    pub errors: ErrorStats,
}

/// Dependency checks behind the access pipeline.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Always "ok" once the router is serving.
    pub service: String,
    /// Ledger backend ("evm", "local") or "unconfigured".
    pub ledger: String,
    /// Ledger reachability; only probed on readiness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_reachable: Option<String>,
    /// Circuit artifacts ("loaded" or "missing").
    pub circuit: String,
    /// Hex SHA-256 of the loaded proving key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zkey_digest: Option<String>,
    /// Data directory availability.
    pub data_dir: String,
}

/// Liveness body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check_data_dir(state: &AppState) -> String {
    match state.storage.health_check() {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Data directory check failed");
            "unavailable".to_string()
        }
    }
}

async fn check_ledger_reachable(state: &AppState) -> Option<String> {
    let ledger = state.pipeline.ledger();
    if !ledger.is_configured() {
        return None;
    }
    Some(match ledger.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger probe failed");
            "unreachable".to_string()
        }
    })
}

async fn report(state: &AppState, probe_ledger: bool) -> (StatusCode, Json<ReadyResponse>) {
    let ledger = state.pipeline.ledger();
    let circuit_ok = state.pipeline.generator().is_ready();
    let zkey_digest = state
        .pipeline
        .generator()
        .artifacts()
        .ok()
        .map(|artifacts| artifacts.verification_key_file().zkey_digest);
    let data_dir = check_data_dir(state);
    let ledger_reachable = if probe_ledger {
        check_ledger_reachable(state).await
    } else {
        None
    };

    let all_ok = ledger.is_configured()
        && circuit_ok
        && data_dir == "ok"
        && ledger_reachable.as_deref().map(|s| s == "ok").unwrap_or(true);

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            ledger: ledger.describe().to_string(),
            ledger_reachable,
            circuit: if circuit_ok { "loaded" } else { "missing" }.to_string(),
            zkey_digest,
            data_dir,
        },
        errors: state.pipeline.resilience().history().stats(),
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Configuration-level status without contacting the ledger.
///
/// 503 when the ledger is unconfigured, the circuit is missing or the data
/// directory is unusable.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is degraded", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    report(&state, false).await
}

/// Liveness probe. Never touches dependencies.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe.
///
/// Same checks as `/health`, plus a round trip to the ledger.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    report(&state, true).await
}
