use crate::adapters::storage::StorageError;
use crate::domain::message::DraftError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Storage error: {0}")]
    Upstream(#[from] StorageError),
    #[error("No file provided")]
    MissingFile,
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Authentication failed")]
    AuthError,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<DraftError> for AppError {
    fn from(e: DraftError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
            Self::Upstream(e) => {
                // Upstream bodies are logged here and never echoed.
                tracing::error!(error = ?e, "Upload failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file".to_string(), Some(e.to_string()))
            }
            Self::MissingFile => {
                tracing::debug!("Upload without file part");
                (StatusCode::BAD_REQUEST, "No file provided".to_string(), None)
            }
            Self::PayloadTooLarge => {
                tracing::debug!("Payload too large");
                (StatusCode::PAYLOAD_TOO_LARGE, "File too large".to_string(), None)
            }
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None)
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string(), None)
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg, None)
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
        };

        let body = match details {
            Some(details) => Json(json!({ "error": message, "details": details })),
            None => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}
