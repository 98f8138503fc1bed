// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Endpoints that drive the in-process ledger.
//!
//! Only available when `LOCAL_LEDGER` is enabled; otherwise every handler
//! answers 404. Access keys returned here are secrets and are meant for
//! development clients only.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::client::ClientAddr;
use super::records::{parse_record_id, RecordResponse};
use crate::{
    error::ApiError,
    ledger::LocalLedger,
    models::{parse_address, AccessKey, RecordId},
    proof::ProofPayload,
    state::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishRecordRequest {
    pub record_id: RecordId,
    pub owner: String,
    pub issuer: String,
    /// Plaintext content identifier, sealed per member.
    pub reference: String,
    #[serde(default)]
    pub metadata: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub granter: String,
    pub grantee: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyedRequest {
    pub requester_addr: String,
    /// Hex-encoded access key.
    pub access_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyResponse {
    pub record_id: RecordId,
    pub access_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnshareResponse {
    /// New membership root, decimal.
    pub merkle_root: String,
}

fn local(state: &AppState) -> Result<Arc<LocalLedger>, ApiError> {
    state
        .local_ledger()
        .cloned()
        .ok_or_else(|| ApiError::not_found("local ledger is not enabled"))
}

#[utoipa::path(
    post,
    path = "/ledger/records",
    request_body = PublishRecordRequest,
    tag = "Local Ledger",
    responses(
        (status = 201, body = AccessKeyResponse),
        (status = 400, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn publish_record(
    State(state): State<AppState>,
    Json(request): Json<PublishRecordRequest>,
) -> Result<(StatusCode, Json<AccessKeyResponse>), ApiError> {
    let ledger = local(&state)?;
    let owner = parse_address(&request.owner)?;
    let issuer = parse_address(&request.issuer)?;
    let key = ledger.publish_record(
        request.record_id,
        owner,
        issuer,
        &request.reference,
        &request.metadata,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(AccessKeyResponse {
            record_id: request.record_id,
            access_key: key.to_hex(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/ledger/records/{id}/share",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body = ShareRequest,
    tag = "Local Ledger",
    responses(
        (status = 200, body = AccessKeyResponse),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn share_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let ledger = local(&state)?;
    let record_id = parse_record_id(&id)?;
    let key = ledger.share(
        record_id,
        parse_address(&request.granter)?,
        parse_address(&request.grantee)?,
    )?;
    Ok(Json(AccessKeyResponse {
        record_id,
        access_key: key.to_hex(),
    }))
}

#[utoipa::path(
    post,
    path = "/ledger/records/{id}/unshare",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body = ShareRequest,
    tag = "Local Ledger",
    responses(
        (status = 200, body = UnshareResponse),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn unshare_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<UnshareResponse>, ApiError> {
    let ledger = local(&state)?;
    let record_id = parse_record_id(&id)?;
    let root = ledger.unshare(
        record_id,
        parse_address(&request.granter)?,
        parse_address(&request.grantee)?,
    )?;
    Ok(Json(UnshareResponse {
        merkle_root: root.to_string(),
    }))
}

/// Generate a proof for `requester` from its access key.
#[utoipa::path(
    post,
    path = "/ledger/records/{id}/proof",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body = KeyedRequest,
    tag = "Local Ledger",
    responses(
        (status = 200, body = ProofPayload),
        (status = 403, body = crate::error::ErrorBody),
        (status = 500, body = crate::error::ErrorBody)
    )
)]
pub async fn generate_proof(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<KeyedRequest>,
) -> Result<Json<ProofPayload>, ApiError> {
    local(&state)?;
    let record_id = parse_record_id(&id)?;
    let requester = parse_address(&request.requester_addr)?;
    let key = AccessKey::from_hex(&request.access_key)?;

    let proof = state
        .pipeline
        .generate_proof(requester, record_id, key, &CancellationToken::new())
        .await?;
    Ok(Json(proof.to_payload()))
}

/// Full client flow: build, prove, verify and decrypt.
#[utoipa::path(
    post,
    path = "/ledger/records/{id}/access",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body = KeyedRequest,
    tag = "Local Ledger",
    responses(
        (status = 200, body = RecordResponse),
        (status = 403, body = crate::error::ErrorBody),
        (status = 429, body = crate::error::ErrorBody)
    )
)]
pub async fn request_access(
    Path(id): Path<String>,
    State(state): State<AppState>,
    client: ClientAddr,
    Json(request): Json<KeyedRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    local(&state)?;
    let record_id = parse_record_id(&id)?;
    let requester = parse_address(&request.requester_addr)?;
    let key = AccessKey::from_hex(&request.access_key)?;

    let access = state
        .pipeline
        .request_access(
            client.as_str(),
            requester,
            record_id,
            key,
            &CancellationToken::new(),
        )
        .await?;
    Ok(Json(RecordResponse::from(access)))
}
