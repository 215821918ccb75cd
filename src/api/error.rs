use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::db::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid JSON: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: &str, id: i32) -> Self {
        ApiError::NotFound(format!("{what} {id} not found"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Unprocessable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateInvoiceNumber(_) => ApiError::Conflict(err.to_string()),
            StorageError::UnknownInvoice(_) => ApiError::NotFound(err.to_string()),
            StorageError::AmountOutOfRange(_) => ApiError::Unprocessable(err.to_string()),
            StorageError::Backend(inner) => ApiError::Internal(inner),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ApiError::Validation(err) => ErrorResponse {
                error: "Validation error".to_string(),
                details: Some(err.to_string()),
            },
            ApiError::BadRequest(details) => ErrorResponse {
                error: "Invalid JSON".to_string(),
                details: Some(details),
            },
            ApiError::Internal(err) => {
                error!(error = ?err, "request failed");
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    details: None,
                }
            }
            ApiError::NotFound(msg) | ApiError::Conflict(msg) | ApiError::Unprocessable(msg) => {
                ErrorResponse {
                    error: msg,
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn storage_errors_map_to_statuses() {
        let conflict = ApiError::from(StorageError::DuplicateInvoiceNumber("INV-001".into()));
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let missing = ApiError::from(StorageError::UnknownInvoice(3));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let backend = ApiError::from(StorageError::Backend(anyhow!("lock poisoned")));
        assert_eq!(backend.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = ApiError::Internal(anyhow!("secret connection string")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn amount_overflow_is_unprocessable() {
        let err = ApiError::from(StorageError::from(crate::billing::AmountOverflow));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn bad_request_is_400() {
        let response = ApiError::BadRequest("expected value".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_message_names_resource() {
        let err = ApiError::not_found("invoice", 9);
        assert_eq!(err.to_string(), "Not found: invoice 9 not found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
