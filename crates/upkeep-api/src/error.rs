//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps engine and state-machine errors to HTTP status codes with a JSON
//! body of the form `{"error": {"code", "message", "details"?}}`.
//! Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use upkeep_dispatch::EngineError;
use upkeep_state::TransitionError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "CONFLICT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional context for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or headers could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Actor may not perform the action or is outside the tenant (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Conflict carrying structured context, e.g. the stages involved (409).
    #[error("conflict: {message}")]
    ConflictWithDetails {
        message: String,
        details: serde_json::Value,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) | Self::ConflictWithDetails { .. } => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::ConflictWithDetails { message, .. } => message.clone(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match self {
            Self::ConflictWithDetails { details, .. } => Some(details),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<upkeep_core::ValidationError> for AppError {
    fn from(err: upkeep_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match &err {
            TransitionError::InvalidTransition { from, to } => Self::ConflictWithDetails {
                message: err.to_string(),
                details: serde_json::json!({ "from": from, "to": to }),
            },
            TransitionError::AlreadyTerminal { stage } => Self::ConflictWithDetails {
                message: err.to_string(),
                details: serde_json::json!({ "stage": stage }),
            },
            TransitionError::ProviderRequired => Self::Conflict(err.to_string()),
            TransitionError::Forbidden { .. } | TransitionError::TenantMismatch { .. } => {
                Self::Forbidden(err.to_string())
            }
            TransitionError::InvalidEntryStage { .. } | TransitionError::Validation(_) => {
                Self::Validation(err.to_string())
            }
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Transition(inner) => inner.into(),
            EngineError::Conflict(conflict) => Self::ConflictWithDetails {
                message: conflict.to_string(),
                details: serde_json::json!({
                    "expected_version": conflict.expected,
                    "actual_version": conflict.actual,
                    "retryable": true,
                }),
            },
            EngineError::NotFound(id) => Self::NotFound(format!("request {id}")),
            EngineError::UnknownProvider(_) | EngineError::InvalidMetadata(_) => {
                Self::Validation(err.to_string())
            }
            EngineError::Storage(msg) => Self::Internal(msg),
        }
    }
}
