//! Export and download endpoints

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::imaging::base64;
use crate::storage::ExportFormat;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_filename() -> String {
    "result.png".to_string()
}

fn default_format() -> String {
    "png".to_string()
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted: usize,
}

/// POST /api/files/export
pub async fn export(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResponse>> {
    let image = base64::decode_image(&request.image, "image")?;
    let stored = state
        .exports
        .save(&image, &request.filename, ExportFormat::from_name(&request.format))
        .await?;

    Ok(Json(ExportResponse {
        success: true,
        download_url: format!("/api/files/download/{}", stored),
    }))
}

/// GET /api/files/download/:filename
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse> {
    let bytes = state.exports.read(&filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

/// DELETE /api/files/cleanup
pub async fn cleanup(State(state): State<Arc<AppState>>) -> Result<Json<CleanupResponse>> {
    let deleted = state.exports.cleanup_all().await?;
    Ok(Json(CleanupResponse { success: true, deleted }))
}
