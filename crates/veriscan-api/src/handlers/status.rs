use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use veriscan_core::ScanStatus;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub file_id: Uuid,
    pub file_name: String,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub last_checked: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/v0/files/{file_id}/status",
    tag = "files",
    params(
        ("file_id" = Uuid, Path, description = "Id returned by the upload endpoint")
    ),
    responses(
        (status = 200, description = "Latest scan status", body = StatusResponse),
        (status = 404, description = "Unknown file id", body = ErrorResponse)
    )
)]
pub async fn get_file_status(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, HttpAppError> {
    let record = state.status_store.get_latest(file_id).await?;

    Ok(Json(StatusResponse {
        file_id: record.file_id,
        file_name: record.file_name,
        status: record.status,
        detail: record.detail,
        last_checked: Utc::now(),
    }))
}
