use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use veriscan_core::AppError;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub file_id: Uuid,
    pub status: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/v0/files",
    tag = "files",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload accepted for scanning", body = UploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Upload failed", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("failed to read upload: {}", e)))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let (file_name, data) = upload
        .ok_or_else(|| AppError::InvalidInput("multipart field 'file' is required".to_string()))?;

    let (file_id, event) = state.intake.accept_upload(&file_name, data).await?;

    // The scan proceeds even if the caller disconnects now; the 202 only
    // acknowledges acceptance.
    state
        .event_queue
        .submit(event)
        .await
        .map_err(HttpAppError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            file_id,
            status: "PENDING".to_string(),
            message: "file accepted for scanning; poll the status endpoint".to_string(),
        }),
    ))
}
