// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::fees::FeeError;
use crate::providers::ProviderError;
use crate::storage::DbError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Failures of the order workflows.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Unknown product, seller, order or token.
    #[error("{0}")]
    NotFound(String),

    /// Token expired or already used.
    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    Conflict(String),

    /// Upstream payment, FX or PDF service failure.
    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn status(&self) -> StatusCode {
        match self {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Gone(_) => StatusCode::GONE,
            WorkflowError::Conflict(_) => StatusCode::CONFLICT,
            WorkflowError::Provider(ProviderError::NotConfigured(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WorkflowError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WorkflowError::Storage(_) | WorkflowError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            WorkflowError::Storage(_) => "Internal storage error".to_string(),
            WorkflowError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Missing and duplicate records become domain errors; the rest stay storage
/// failures.
impl From<DbError> for WorkflowError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => WorkflowError::NotFound(format!("{what} not found")),
            DbError::AlreadyExists(what) => {
                WorkflowError::Conflict(format!("{what} already exists"))
            }
            other => WorkflowError::Storage(other),
        }
    }
}

impl From<FeeError> for WorkflowError {
    fn from(err: FeeError) -> Self {
        WorkflowError::Validation(err.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        ApiError::new(status, err.public_message())
    }
}

/// Error for admin actions that answer `{"success": false, "error": …}`.
#[derive(Debug)]
pub struct ActionError(pub WorkflowError);

#[derive(Serialize)]
struct ActionErrorBody {
    success: bool,
    error: String,
}

impl From<WorkflowError> for ActionError {
    fn from(err: WorkflowError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ActionError {
    fn from(rejection: JsonRejection) -> Self {
        Self(WorkflowError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Admin action failed");
        }
        let body = Json(ActionErrorBody {
            success: false,
            error: self.0.public_message(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[test]
    fn workflow_errors_map_to_status_codes() {
        let cases = [
            (WorkflowError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (WorkflowError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (WorkflowError::Gone("x".into()), StatusCode::GONE),
            (WorkflowError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                WorkflowError::Provider(ProviderError::Request("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                WorkflowError::Provider(ProviderError::NotConfigured("Stripe")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn missing_and_duplicate_records_become_domain_errors() {
        let missing = WorkflowError::from(DbError::NotFound("Order o".into()));
        assert!(matches!(missing, WorkflowError::NotFound(ref m) if m == "Order o not found"));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let duplicate = WorkflowError::from(DbError::AlreadyExists("Token".into()));
        assert!(matches!(duplicate, WorkflowError::Conflict(_)));
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let err = WorkflowError::Storage(DbError::Serde(
            serde_json::from_str::<u8>("x").unwrap_err(),
        ));
        let api: ApiError = err.into();
        assert_eq!(api.message, "Internal storage error");
    }

    #[tokio::test]
    async fn action_error_has_success_false() {
        let response =
            ActionError(WorkflowError::Validation("reviewed_by is required".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "reviewed_by is required");
    }
}
