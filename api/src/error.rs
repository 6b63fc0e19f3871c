use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metacoach_core::error::{self, ApiError};
use metacoach_engine::EngineError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Unknown session, user, or resource (404)
    NotFound { message: String },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidSignals(inner) => AppError::Validation {
                message: inner.message.clone(),
                field: inner.field.clone(),
                received: inner.received.clone(),
                docs_hint: Some(
                    "signals must contain exactly the 12 dimension keys \
                     p1-p4, m1-m3, e1-e3, r1-r2, each a number in [0.0, 3.0]"
                        .to_string(),
                ),
            },
            EngineError::SessionNotFound { session_id } => AppError::NotFound {
                message: format!("session '{}' not found", session_id),
            },
            EngineError::UnknownTool { tool_id } => AppError::Validation {
                message: format!("unknown intervention tool '{}'", tool_id),
                field: Some("tool_id".to_string()),
                received: Some(serde_json::Value::String(tool_id)),
                docs_hint: Some(
                    "tool_id must be one of the catalogue ids, e.g. 'task-planner' \
                     or 'overreliance-circuit-breaker'"
                        .to_string(),
                ),
            },
            EngineError::MissingSignature => AppError::Validation {
                message: "action 'override_signed' requires a non-empty signature".to_string(),
                field: Some("signature".to_string()),
                received: None,
                docs_hint: Some(
                    "Pass the user's explicit justification string as 'signature' \
                     when overriding a hard intervention."
                        .to_string(),
                ),
            },
        }
    }
}
