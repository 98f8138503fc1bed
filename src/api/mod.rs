// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    pipeline::AccessMode,
    proof::ProofPayload,
    resilience::{ErrorStats, ResilienceState},
    sharing::{CreateTokenRequest, Permission, PermissionGrant, SharingToken, ValidationResult},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod client;
pub mod health;
pub mod ledger;
pub mod records;
pub mod tokens;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route(
            "/records/{id}",
            get(records::get_record).post(records::open_record),
        )
        .route(
            "/records/{id}/document",
            get(records::document_status).post(records::resolve_document),
        )
        .route("/tokens", post(tokens::create_token))
        .route("/tokens/{token_id}/validate", post(tokens::validate_token))
        .route("/tokens/{token_id}/revoke", post(tokens::revoke_token))
        .route("/tokens/{token_id}/refresh", post(tokens::refresh_token))
        .route("/tokens/{token_id}/audit", get(tokens::token_audit_trail))
        .route("/ledger/records", post(ledger::publish_record))
        .route("/ledger/records/{id}/share", post(ledger::share_record))
        .route("/ledger/records/{id}/unshare", post(ledger::unshare_record))
        .route("/ledger/records/{id}/proof", post(ledger::generate_proof))
        .route("/ledger/records/{id}/access", post(ledger::request_access))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        records::get_record,
        records::open_record,
        records::document_status,
        records::resolve_document,
        tokens::create_token,
        tokens::validate_token,
        tokens::revoke_token,
        tokens::refresh_token,
        tokens::token_audit_trail,
        ledger::publish_record,
        ledger::share_record,
        ledger::unshare_record,
        ledger::generate_proof,
        ledger::request_access
    ),
    components(
        schemas(
            ErrorBody,
            ErrorStats,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            records::OpenRecordRequest,
            records::RecordMetadata,
            records::RecordResponse,
            records::DocumentStatus,
            records::DocumentResponse,
            tokens::ValidateTokenRequest,
            tokens::RevokeTokenRequest,
            tokens::RevokeTokenResponse,
            tokens::RefreshTokenRequest,
            ledger::PublishRecordRequest,
            ledger::ShareRequest,
            ledger::KeyedRequest,
            ledger::AccessKeyResponse,
            ledger::UnshareResponse,
            ProofPayload,
            AccessMode,
            ResilienceState,
            CreateTokenRequest,
            Permission,
            PermissionGrant,
            SharingToken,
            ValidationResult,
            AuditEvent,
            AuditEventType
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Records", description = "Proof-gated record access"),
        (name = "Sharing", description = "Sharing-token delegation"),
        (name = "Local Ledger", description = "In-process ledger for development")
    )
)]
struct ApiDoc;
