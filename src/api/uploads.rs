use crate::api::AppState;
use crate::api::schemas::uploads::{ConfigCheckResponse, UploadResponse};
use crate::domain::upload::IncomingFile;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};

const FILE_FIELD: &str = "file";

fn multipart_error(e: &MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
    }
}

/// Forwards the `file` part of a multipart form to the bucket.
///
/// # Errors
/// Returns `AppError::MissingFile` if the request is not a form or has no `file` part.
/// Returns `AppError::Upstream` if the bucket rejects the upload.
pub async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(reason = %rejection.body_text(), "Upload is not a multipart form");
        AppError::MissingFile
    })?;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;

        file = Some(IncomingFile { file_name, content_type, bytes });
        break;
    }

    let file = file.ok_or(AppError::MissingFile)?;
    let uploaded = state.upload_gateway.upload(file).await?;

    Ok(Json(uploaded.into()))
}

/// Reports which storage credentials are configured.
pub async fn storage_config_check(State(state): State<AppState>) -> Json<ConfigCheckResponse> {
    Json(ConfigCheckResponse::from(&state.config.storage))
}
