//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use skillrun_types::error::{RunError, SkillError};

/// Seconds a client should wait before resubmitting after `Backpressure`.
const RETRY_AFTER_SECS: &str = "1";

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Run submission, lookup, cancellation and listing errors.
    Run(RunError),
    /// Skill authoring errors.
    Skill(SkillError),
    /// Missing or unknown API key.
    Unauthorized(String),
    /// Malformed request parameters.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        AppError::Run(e)
    }
}

impl From<SkillError> for AppError {
    fn from(e: SkillError) -> Self {
        AppError::Skill(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Run(e) => {
                let (status, code) = match e {
                    RunError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    RunError::InvalidReference(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REFERENCE")
                    }
                    RunError::Backpressure => (StatusCode::SERVICE_UNAVAILABLE, "BACKPRESSURE"),
                    RunError::StaleTransition { .. } => (StatusCode::CONFLICT, "STALE_TRANSITION"),
                    RunError::NotFound => (StatusCode::NOT_FOUND, "RUN_NOT_FOUND"),
                    RunError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    RunError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                };
                (status, code, e.to_string())
            }
            AppError::Skill(e) => {
                let (status, code) = match e {
                    SkillError::NotFound => (StatusCode::NOT_FOUND, "SKILL_NOT_FOUND"),
                    SkillError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    SkillError::NameConflict(_) => (StatusCode::CONFLICT, "NAME_CONFLICT"),
                    SkillError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    SkillError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                };
                (status, code, e.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(code, error = %message, "request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        if matches!(self, AppError::Run(RunError::Backpressure)) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
