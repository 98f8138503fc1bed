// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ApiError,
    sharing::{CreateTokenRequest, Permission, SharingToken, ValidationResult},
    state::AppState,
    storage::AuditEvent,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub requester: String,
    pub action: Permission,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    pub revoker: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenResponse {
    /// False when the token was already revoked.
    pub revoked: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub requester: String,
    pub extra_duration_secs: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrailQuery {
    pub requester: String,
    /// Day to read (`YYYY-MM-DD`, UTC). Defaults to today.
    pub date: Option<String>,
}

fn parse_token_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("token id must be a UUID"))
}

#[utoipa::path(
    post,
    path = "/tokens",
    request_body = CreateTokenRequest,
    tag = "Sharing",
    responses(
        (status = 201, body = SharingToken),
        (status = 400, body = crate::error::ErrorBody)
    )
)]
pub async fn create_token(
    State(state): State<AppState>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<SharingToken>), ApiError> {
    let token = state.tokens.create(request)?;
    Ok((StatusCode::CREATED, Json(token)))
}

#[utoipa::path(
    post,
    path = "/tokens/{token_id}/validate",
    params(("token_id" = String, Path, description = "Sharing token identifier")),
    request_body = ValidateTokenRequest,
    tag = "Sharing",
    responses((status = 200, body = ValidationResult))
)]
pub async fn validate_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let token_id = parse_token_id(&token_id)?;
    Ok(Json(
        state
            .tokens
            .validate(&token_id, &request.requester, request.action),
    ))
}

#[utoipa::path(
    post,
    path = "/tokens/{token_id}/revoke",
    params(("token_id" = String, Path, description = "Sharing token identifier")),
    request_body = RevokeTokenRequest,
    tag = "Sharing",
    responses(
        (status = 200, body = RevokeTokenResponse),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn revoke_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RevokeTokenRequest>,
) -> Result<Json<RevokeTokenResponse>, ApiError> {
    let token_id = parse_token_id(&token_id)?;
    let revoked = state.tokens.revoke(&token_id, &request.revoker)?;
    Ok(Json(RevokeTokenResponse { revoked }))
}

#[utoipa::path(
    post,
    path = "/tokens/{token_id}/refresh",
    params(("token_id" = String, Path, description = "Sharing token identifier")),
    request_body = RefreshTokenRequest,
    tag = "Sharing",
    responses(
        (status = 200, body = SharingToken),
        (status = 400, body = crate::error::ErrorBody),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn refresh_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<SharingToken>, ApiError> {
    let token_id = parse_token_id(&token_id)?;
    let token = state
        .tokens
        .refresh(&token_id, &request.requester, request.extra_duration_secs)?;
    Ok(Json(token))
}

#[utoipa::path(
    get,
    path = "/tokens/{token_id}/audit",
    params(
        ("token_id" = String, Path, description = "Sharing token identifier"),
        AuditTrailQuery
    ),
    tag = "Sharing",
    responses(
        (status = 200, body = Vec<AuditEvent>),
        (status = 400, body = crate::error::ErrorBody),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn token_audit_trail(
    Path(token_id): Path<String>,
    Query(query): Query<AuditTrailQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let token_id = parse_token_id(&token_id)?;
    let date = query
        .date
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
    let events = state.tokens.audit_trail(&token_id, &query.requester, &date)?;
    Ok(Json(events))
}
