use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM service error: {0}")]
    LlmService(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Tool call failed: {0}")]
    ToolCall(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message without the variant prefix, used where errors are shown as plain text.
    pub fn message(&self) -> String {
        match self {
            AppError::Database(msg)
            | AppError::Connection(msg)
            | AppError::InvalidSql(msg)
            | AppError::Validation(msg)
            | AppError::LlmService(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::ToolCall(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Transcription(_) | AppError::Chart(_) => self.to_string(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::Database(msg) => {
                let enhanced_msg = if msg.contains("does not exist") || msg.contains("no such table") {
                    format!("{} Check that the table name is correct.", msg)
                } else if msg.contains("timeout") {
                    format!("{} Consider simplifying your query or checking database performance.", msg)
                } else {
                    msg
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail::new("DATABASE_ERROR", enhanced_msg),
                )
            }
            AppError::Connection(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("CONNECTION_ERROR", msg),
            ),
            AppError::InvalidSql(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SQL", msg)
                    .with_details("Only SELECT queries are allowed."),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg),
            ),
            AppError::LlmService(msg) => {
                let detail = ErrorDetail::new("LLM_SERVICE_ERROR", msg.clone());
                let detail = if msg.contains("not configured") {
                    detail.with_details("Set LLM_BASE_URL to enable natural language queries.")
                } else {
                    detail
                };
                (StatusCode::BAD_GATEWAY, detail)
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", msg),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", msg),
            ),
            AppError::Transcription(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("TRANSCRIPTION_ERROR", msg),
            ),
            AppError::ToolCall(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("TOOL_CALL_ERROR", msg),
            ),
            AppError::Chart(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("CHART_ERROR", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
