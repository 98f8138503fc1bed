// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::StorageError;
use crate::zk_error::{ZkError, ZkErrorKind};

/// Longest message returned to clients.
const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub kind: Option<ZkErrorKind>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ZkErrorKind>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: sanitize(&message.into()),
            kind: None,
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message).with_kind(ZkErrorKind::NotFound)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message).with_kind(ZkErrorKind::InvalidInput)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_kind(mut self, kind: ZkErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ZkErrorKind) -> StatusCode {
    match kind {
        ZkErrorKind::InvalidInput | ZkErrorKind::InvalidAccessKey => StatusCode::BAD_REQUEST,
        ZkErrorKind::AccessDenied
        | ZkErrorKind::ProofVerificationFailed
        | ZkErrorKind::InvalidMerkleProof
        | ZkErrorKind::TimestampExpired
        | ZkErrorKind::CredentialNotFound => StatusCode::FORBIDDEN,
        ZkErrorKind::NotFound => StatusCode::NOT_FOUND,
        ZkErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ZkErrorKind::CircuitNotLoaded
        | ZkErrorKind::ProofGenerationFailed
        | ZkErrorKind::EncryptionFailed
        | ZkErrorKind::DecryptionFailed
        | ZkErrorKind::ContractNotInitialized
        | ZkErrorKind::NetworkError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing text for server-side failures. Internal detail stays in
/// the logs.
fn generic_message(kind: ZkErrorKind) -> &'static str {
    match kind {
        ZkErrorKind::ContractNotInitialized => "Ledger contracts are not configured",
        ZkErrorKind::NetworkError => "Ledger is unreachable",
        ZkErrorKind::CircuitNotLoaded => "Proof circuit is not loaded",
        ZkErrorKind::ProofGenerationFailed => "Proof generation failed",
        ZkErrorKind::EncryptionFailed | ZkErrorKind::DecryptionFailed => {
            "Record reference could not be processed"
        }
        _ => "Internal server error",
    }
}

impl From<ZkError> for ApiError {
    fn from(e: ZkError) -> Self {
        let kind = e.kind();
        let status = status_for(kind);
        let message = if status.is_server_error() {
            tracing::error!(kind = %kind, error = %e, "Request failed");
            generic_message(kind).to_string()
        } else {
            tracing::debug!(kind = %kind, error = %e, "Request rejected");
            e.to_string()
        };
        let retry_after_secs = match e {
            ZkError::RateLimitExceeded { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        };
        Self {
            retry_after_secs,
            ..Self::new(status, message).with_kind(kind)
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "Storage failure");
        Self::internal("Storage failure")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.kind,
        });
        let mut response = (self.status, body).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Strip markup and control characters, then bound the length.
pub fn sanitize(message: &str) -> String {
    let mut out = String::with_capacity(message.len().min(MAX_MESSAGE_LEN));
    let mut in_tag = false;
    for c in message.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag || c.is_control() => {}
            _ => out.push(c),
        }
    }
    let trimmed = out.trim();
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        trimmed.chars().take(MAX_MESSAGE_LEN).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(status_for(ZkErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ZkErrorKind::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ZkErrorKind::ProofVerificationFailed), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ZkErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ZkErrorKind::RateLimitExceeded), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_for(ZkErrorKind::ContractNotInitialized),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn server_errors_hide_detail() {
        let err = ApiError::from(ZkError::Network("http://10.0.0.3:8545 refused".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("10.0.0.3"));
        assert_eq!(err.kind, Some(ZkErrorKind::NetworkError));
    }

    #[test]
    fn sanitize_strips_markup_and_control_chars() {
        assert_eq!(sanitize("<script>alert(1)</script>bad\u{7}input"), "alert(1)badinput");
        assert_eq!(sanitize(&"x".repeat(500)).len(), MAX_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn into_response_returns_code_and_retry_after() {
        let response =
            ApiError::from(ZkError::RateLimitExceeded { retry_after_secs: 12 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "RATE_LIMIT_EXCEEDED");
        assert!(body["error"].as_str().unwrap().contains("12s"));
    }

    #[tokio::test]
    async fn bad_request_body() {
        let response = ApiError::bad_request("bad data").into_response();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"INVALID_INPUT"}"#);
    }
}
