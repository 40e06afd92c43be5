use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    dispatcher::DispatcherError, event_bus::EventBusError, lifecycle::LifecycleError,
    policy::PolicyError, service_engine::ServiceEngineError, tx_submitter::SubmitterError,
};
use utils::error::StoreError;

/// The taxonomy from spec.md §7, each kind mapped to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimited,
    Timeout,
    Upstream,
    Internal,
}

impl ApiErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorKind::Validation => StatusCode::BAD_REQUEST,
            ApiErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ApiErrorKind::Authorization => StatusCode::FORBIDDEN,
            ApiErrorKind::NotFound => StatusCode::NOT_FOUND,
            ApiErrorKind::Conflict => StatusCode::CONFLICT,
            ApiErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiErrorKind::Upstream => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The single `IntoResponse` boundary. Every module error converts into this
/// via `From`, and the body always takes the shape
/// `{ "error": { "code", "message", "details" } }`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, "SVC_VALIDATION", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, "DB_NOT_FOUND", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Authorization, "AUTH_FORBIDDEN", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Authentication, "AUTH_MISSING_TOKEN", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Conflict, "SVC_CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Internal, "SVC_INTERNAL", message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: &'static str,
    message: String,
    details: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("record not found"),
            StoreError::InvalidLimit => ApiError::validation("limit must not be negative"),
            StoreError::Io(e) => ApiError::new(ApiErrorKind::Internal, "DB_IO", e.to_string()),
            StoreError::Serde(e) => {
                ApiError::new(ApiErrorKind::Internal, "DB_SERDE", e.to_string())
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::new(ApiErrorKind::Internal, "LIFECYCLE_ERROR", err.to_string())
    }
}

impl From<EventBusError> for ApiError {
    fn from(err: EventBusError) -> Self {
        match err {
            EventBusError::BusUnavailable => {
                ApiError::new(ApiErrorKind::Upstream, "BUS_UNAVAILABLE", err.to_string())
            }
        }
    }
}

impl<E: std::fmt::Display> From<DispatcherError<E>> for ApiError {
    fn from(err: DispatcherError<E>) -> Self {
        let message = err.to_string();
        match err {
            DispatcherError::Cancelled => {
                ApiError::new(ApiErrorKind::Timeout, "DISPATCH_CANCELLED", message)
            }
            DispatcherError::Exhausted(_) => {
                ApiError::new(ApiErrorKind::Upstream, "DISPATCH_EXHAUSTED", message)
            }
        }
    }
}

impl From<SubmitterError> for ApiError {
    fn from(err: SubmitterError) -> Self {
        match err {
            SubmitterError::NotFound => ApiError::not_found("submission not found"),
            SubmitterError::Timeout => {
                ApiError::new(ApiErrorKind::Timeout, "SUBMIT_TIMEOUT", err.to_string())
            }
            SubmitterError::Upstream(_) => {
                ApiError::new(ApiErrorKind::Upstream, "SUBMIT_UPSTREAM", err.to_string())
            }
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::MissingTenant => ApiError::unauthorized(err.to_string()),
            PolicyError::InvalidToken => ApiError::unauthorized(err.to_string()),
            PolicyError::NotOwner => ApiError::forbidden(err.to_string()),
            PolicyError::StrictIdentityRequired => {
                ApiError::new(ApiErrorKind::Internal, "AUTH_PROVENANCE_MISSING", err.to_string())
            }
        }
    }
}

impl From<ServiceEngineError> for ApiError {
    fn from(err: ServiceEngineError) -> Self {
        match err {
            ServiceEngineError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceEngineError::NotFound(msg) => ApiError::not_found(msg),
            ServiceEngineError::Validation(msg) => ApiError::validation(msg),
        }
    }
}
