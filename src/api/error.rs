//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::contact::ContactError;
use crate::provisioning::ProvisionError;
use crate::storage::{FileError, StorageError};
use crate::websocket::HubError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable credentials
    #[error("{0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Contact(#[from] ContactError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Hub(#[from] HubError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (dependency down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    /// Status code and machine-readable error code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(e) => storage_status(e),
            ApiError::Auth(e) => auth_status(e),
            ApiError::Provision(e) => match e {
                ProvisionError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                ProvisionError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                ProvisionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                ProvisionError::EmailTaken(_) => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
                ProvisionError::Auth(e) => auth_status(e),
                ProvisionError::Storage(e) => storage_status(e),
            },
            ApiError::Contact(e) => {
                let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
                let code = match e {
                    ContactError::NotConfigured => "CONTACT_NOT_CONFIGURED",
                    ContactError::Validation(_) => "VALIDATION_ERROR",
                    ContactError::Timeout => "UPSTREAM_TIMEOUT",
                    ContactError::Upstream { .. }
                    | ContactError::Unavailable
                    | ContactError::Request(_) => "UPSTREAM_ERROR",
                };
                (status, code)
            }
            ApiError::File(e) => match e {
                FileError::UnknownBucket(_) | FileError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                FileError::InvalidName(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                FileError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
                FileError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            },
            ApiError::Hub(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

fn storage_status(e: &StorageError) -> (StatusCode, &'static str) {
    match e {
        StorageError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StorageError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        StorageError::ForeignKey(_) => (StatusCode::CONFLICT, "FOREIGN_KEY_VIOLATION"),
        StorageError::Invalid(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

fn auth_status(e: &AuthError) -> (StatusCode, &'static str) {
    match e {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        AuthError::SessionExpired => (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED"),
        AuthError::Inactive => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
        AuthError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        AuthError::InvalidResetToken => (StatusCode::BAD_REQUEST, "INVALID_RESET_TOKEN"),
        AuthError::Hash(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        AuthError::Storage(e) => storage_status(e),
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_storage_mapping() {
        let conflict = ApiError::from(StorageError::Conflict {
            table: "companies".to_string(),
            field: "name".to_string(),
            value: "Mapfre".to_string(),
        });
        assert_eq!(conflict.status_and_code(), (StatusCode::CONFLICT, "CONFLICT"));

        let missing = ApiError::from(StorageError::not_found("news", "x"));
        assert_eq!(missing.status_and_code().0, StatusCode::NOT_FOUND);

        let restrict = ApiError::from(StorageError::ForeignKey("products".to_string()));
        assert_eq!(restrict.status_and_code().1, "FOREIGN_KEY_VIOLATION");
    }

    #[test]
    fn test_nested_errors_keep_their_status() {
        let expired = ApiError::from(ProvisionError::Auth(AuthError::SessionExpired));
        assert_eq!(
            expired.status_and_code(),
            (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED")
        );

        let forbidden = ApiError::from(AuthError::Forbidden("news:delete".to_string()));
        assert_eq!(forbidden.status_and_code().0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_contact_mapping() {
        let upstream = ApiError::from(ContactError::Upstream {
            status: 422,
            message: "bad email".to_string(),
        });
        assert_eq!(upstream.status_and_code().0, StatusCode::UNPROCESSABLE_ENTITY);

        let down = ApiError::from(ContactError::Upstream {
            status: 500,
            message: "oops".to_string(),
        });
        assert_eq!(down.status_and_code().0, StatusCode::BAD_GATEWAY);

        assert_eq!(
            ApiError::from(ContactError::Timeout).status_and_code().0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(ContactError::NotConfigured).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::Validation("name is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "Validation error: name is required");
        assert!(body["request_id"].is_string());
    }
}
