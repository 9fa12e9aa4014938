//! Error handling for the karaoke backend.
//!
//! One application error enum covers the whole taxonomy (validation, not-found,
//! conflict, persistence, upstream, processing, cancellation, timeout). Every
//! HTTP endpoint answers errors with the same JSON envelope:
//! `{ "error": "<human text>", "code": "<UPPER_SNAKE>", "details": { ... } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Error envelope returned by every API endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // Validation errors
    #[error("Missing required parameter: {field}")]
    MissingParameter { field: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidParameter { field: String, message: String },

    #[error("Request validation failed")]
    ValidationFailed(validator::ValidationErrors),

    // Resource errors
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Resource conflict: {message}")]
    Conflict { message: String },

    #[error("Resource in use: {message}")]
    InUse { message: String },

    // Business rules
    #[error("Operation not allowed: {reason}")]
    OperationNotAllowed { reason: String },

    // Persistence errors
    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Persistence failure: {message}")]
    Persistence { message: String },

    // External collaborators
    #[error("Upstream service unavailable: {service}")]
    UpstreamUnavailable { service: String },

    #[error("Upstream service error: {service}")]
    Upstream { service: String, message: String },

    // Pipeline processing
    #[error("Processing failed: {message}")]
    Processing { message: String },

    // Cooperative termination
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    // Everything else
    #[error("Internal server error")]
    Internal { message: Option<String> },
}

impl AppError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingParameter {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: Some(message.into()),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingParameter { .. }
            | AppError::InvalidParameter { .. }
            | AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,

            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            AppError::Conflict { .. } | AppError::InUse { .. } => StatusCode::CONFLICT,

            AppError::OperationNotAllowed { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            AppError::UpstreamUnavailable { .. } | AppError::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }

            AppError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            AppError::Persistence { .. }
            | AppError::Processing { .. }
            | AppError::Cancelled
            | AppError::Timeout { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingParameter { .. } => "MISSING_PARAMETERS",
            AppError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AppError::ValidationFailed(_) => "VALIDATION_FAILED",
            AppError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::Conflict { .. } => "RESOURCE_CONFLICT",
            AppError::InUse { .. } => "RESOURCE_IN_USE",
            AppError::OperationNotAllowed { .. } => "OPERATION_NOT_ALLOWED",
            AppError::StoreUnavailable => "STORE_UNAVAILABLE",
            AppError::Persistence { .. } => "PERSISTENCE_FAILURE",
            AppError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
            AppError::Processing { .. } => "PROCESSING_FAILED",
            AppError::Cancelled => "CANCELLED",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ValidationFailed(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "invalid value".to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), json!(messages));
                }
                Some(json!(details))
            }
            AppError::InvalidParameter { field, message } => {
                Some(json!({ "field": field, "message": message }))
            }
            AppError::MissingParameter { field } => Some(json!({ "field": field })),
            AppError::Upstream { service, message } => {
                Some(json!({ "service": service, "message": message }))
            }
            AppError::UpstreamUnavailable { service } => Some(json!({ "service": service })),
            AppError::Timeout { operation } => Some(json!({ "operation": operation })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        match &self {
            AppError::Persistence { .. }
            | AppError::StoreUnavailable
            | AppError::Internal { .. } => {
                tracing::error!(code = %code, error = %self, "server error");
            }
            AppError::Upstream { service, .. } | AppError::UpstreamUnavailable { service } => {
                tracing::warn!(code = %code, service = %service, error = %self, "upstream error");
            }
            _ => {
                tracing::info!(code = %code, error = %self, "client error");
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: self.error_details(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::not_found("Row"),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::Conflict {
                        message: "unique constraint violation".to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    AppError::Conflict {
                        message: "foreign key constraint violation".to_string(),
                    }
                } else {
                    AppError::Persistence {
                        message: err.to_string(),
                    }
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => AppError::StoreUnavailable,
            _ => AppError::Persistence {
                message: err.to_string(),
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationFailed(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidParameter {
            field: "body".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| "upstream".to_string());
        if err.is_timeout() || err.is_connect() {
            AppError::UpstreamUnavailable { service }
        } else {
            AppError::Upstream {
                service,
                message: err.to_string(),
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(format!("io error: {}", err))
    }
}

/// Result type alias for application errors.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::missing("songId").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("Song").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict {
                message: "dup".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::OperationNotAllowed {
                reason: "terminal".into()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::UpstreamUnavailable {
                service: "fetcher".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::StoreUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn envelope_serializes_expected_fields() {
        let err = AppError::missing("videoId");
        let body = ErrorResponse {
            error: err.to_string(),
            code: err.error_code().to_string(),
            details: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["code"], "MISSING_PARAMETERS");
        assert!(value["error"].as_str().unwrap().contains("videoId"));
        assert!(value.get("details").is_none());
    }
}
