use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types.
///
/// Every variant is scoped to a single turn or request; none is fatal to the
/// process or to the session.
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

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model timed out after {0} seconds")]
    ModelTimeout(u64),

    #[error("No relevant tables identified")]
    NoRelevantTables,

    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::ModelTimeout(_) => "MODEL_TIMEOUT",
            AppError::NoRelevantTables => "NO_RELEVANT_TABLES",
            AppError::SchemaUnavailable(_) => "SCHEMA_UNAVAILABLE",
            AppError::UnknownTable(_) => "UNKNOWN_TABLE",
            AppError::QueryExecution(_) => "QUERY_EXECUTION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
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
        let code = self.code();
        let message = self.to_string();
        let (status, error_detail) = match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorDetail::new(code, message)),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorDetail::new(code, message)),
            AppError::NoRelevantTables => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(code, message)
                    .with_details("The planner could not identify any catalog table for this question. Try rephrasing it."),
            ),
            AppError::InvalidSql(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(code, message)
                    .with_details("The generated query was rejected before execution. Only read-only queries over the described schema are allowed."),
            ),
            AppError::SchemaUnavailable(_) | AppError::UnknownTable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorDetail::new(code, message))
            }
            AppError::QueryExecution(_) => (StatusCode::BAD_GATEWAY, ErrorDetail::new(code, message)),
            AppError::ModelUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(code, message)
                    .with_details("Check that LLM_GATEWAY_URL points to a running model server."),
            ),
            AppError::ModelTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, ErrorDetail::new(code, message)),
            AppError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorDetail::new(code, message)),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::new(code, message))
            }
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
