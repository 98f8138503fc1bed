// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::client::ClientAddr;
use crate::{
    error::ApiError,
    ledger::EncryptedRecord,
    models::{parse_address, RecordId},
    pipeline::{AccessMode, RecordAccess},
    proof::ProofPayload,
    resilience::ResilienceState,
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenRecordRequest {
    pub proof: ProofPayload,
    pub requester_addr: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    /// Address whose access is checked.
    pub requester_addr: Option<String>,
}

/// Record as stored on the ledger, without any sealed reference.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub record_id: RecordId,
    pub owner: String,
    /// Current membership root, decimal.
    pub merkle_root: String,
    pub timestamp: u64,
    /// Hex-encoded encrypted metadata.
    pub encrypted_meta: String,
}

impl From<&EncryptedRecord> for RecordMetadata {
    fn from(record: &EncryptedRecord) -> Self {
        Self {
            record_id: record.record_id,
            owner: record.owner.to_string(),
            merkle_root: record.merkle_root.to_string(),
            timestamp: record.timestamp,
            encrypted_meta: alloy::hex::encode(&record.encrypted_meta),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub record_id: RecordId,
    /// Absent when a fallback grant could not read the ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordMetadata>,
    /// Decrypted content reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub access: AccessMode,
    pub trail: Vec<ResilienceState>,
}

impl From<RecordAccess> for RecordResponse {
    fn from(access: RecordAccess) -> Self {
        Self {
            record_id: access.record_id,
            record: access.record.as_ref().map(RecordMetadata::from),
            reference: access.reference.map(|r| r.as_str().to_string()),
            access: access.mode,
            trail: access.trail,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub has_access: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    /// Gateway URL of the decrypted reference.
    pub url: String,
    pub access: AccessMode,
}

pub(crate) fn parse_record_id(raw: &str) -> Result<RecordId, ApiError> {
    Ok(raw.parse::<RecordId>()?)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Err(ApiError::bad_request(
            "Content-Type must be application/json",
        )),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

#[utoipa::path(
    get,
    path = "/records/{id}",
    params(("id" = String, Path, description = "Numeric record identifier")),
    tag = "Records",
    responses(
        (status = 200, body = RecordMetadata),
        (status = 400, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn get_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RecordMetadata>, ApiError> {
    let record_id = parse_record_id(&id)?;
    let record = state.pipeline.record_metadata(record_id).await?;
    Ok(Json(RecordMetadata::from(&record)))
}

#[utoipa::path(
    post,
    path = "/records/{id}",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body = OpenRecordRequest,
    tag = "Records",
    responses(
        (status = 200, body = RecordResponse),
        (status = 400, body = crate::error::ErrorBody),
        (status = 403, body = crate::error::ErrorBody),
        (status = 404, body = crate::error::ErrorBody),
        (status = 429, body = crate::error::ErrorBody),
        (status = 500, body = crate::error::ErrorBody)
    )
)]
pub async fn open_record(
    Path(id): Path<String>,
    State(state): State<AppState>,
    client: ClientAddr,
    payload: Result<Json<OpenRecordRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record_id = parse_record_id(&id)?;
    let request = json_body(payload)?;
    let requester = parse_address(&request.requester_addr)?;

    let access = state
        .pipeline
        .open_record(client.as_str(), record_id, requester, &request.proof)
        .await?;
    Ok(Json(RecordResponse::from(access)))
}

#[utoipa::path(
    get,
    path = "/records/{id}/document",
    params(
        ("id" = String, Path, description = "Numeric record identifier"),
        DocumentQuery
    ),
    tag = "Records",
    responses(
        (status = 200, body = DocumentStatus),
        (status = 400, body = crate::error::ErrorBody)
    )
)]
pub async fn document_status(
    Path(id): Path<String>,
    Query(query): Query<DocumentQuery>,
    State(state): State<AppState>,
) -> Result<Json<DocumentStatus>, ApiError> {
    let record_id = parse_record_id(&id)?;
    let requester = parse_address(query.requester_addr.as_deref().unwrap_or_default())?;
    let has_access = state
        .pipeline
        .document_access_status(record_id, requester)
        .await?;
    Ok(Json(DocumentStatus { has_access }))
}

#[utoipa::path(
    post,
    path = "/records/{id}/document",
    params(("id" = String, Path, description = "Numeric record identifier")),
    request_body(content = OpenRecordRequest, content_type = "application/json"),
    tag = "Records",
    responses(
        (status = 200, body = DocumentResponse),
        (status = 400, body = crate::error::ErrorBody),
        (status = 403, body = crate::error::ErrorBody),
        (status = 429, body = crate::error::ErrorBody)
    )
)]
pub async fn resolve_document(
    Path(id): Path<String>,
    State(state): State<AppState>,
    client: ClientAddr,
    payload: Result<Json<OpenRecordRequest>, JsonRejection>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let record_id = parse_record_id(&id)?;
    let request = json_body(payload)?;
    let requester = parse_address(&request.requester_addr)?;

    let (url, access) = state
        .pipeline
        .resolve_document(client.as_str(), record_id, requester, &request.proof)
        .await?;
    Ok(Json(DocumentResponse {
        url: url.to_string(),
        access,
    }))
}
