use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors from the non-ingest endpoints. Ingest requests never produce one;
/// the router folds every failure into its own envelope.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Metrics are disabled")]
    MetricsDisabled,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::TableNotFound(_) | ServerError::MetricsDisabled | ServerError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    fn error_code(&self) -> &'static str {
        match self {
            ServerError::TableNotFound(_) => "TABLE_NOT_FOUND",
            ServerError::MetricsDisabled => "METRICS_DISABLED",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "ok": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<ingest::ConfigError> for ServerError {
    fn from(err: ingest::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}
