//! Preprocessing endpoints: line extraction and segmentation

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::detectors::MethodInfo;
use crate::error::{AppError, Result};
use crate::imaging::base64;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessLinesRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub method: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProcessSegmentRequest {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub image: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MethodsResponse {
    pub methods: Vec<MethodInfo>,
}

/// POST /api/process/lines
pub async fn process_lines(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessLinesRequest>,
) -> Result<Json<ProcessResponse>> {
    let method = u8::try_from(request.method)
        .map_err(|_| AppError::InvalidRequest(format!("Unknown line detection method: {}", request.method)))?;
    let detector = state.detectors.get(method).await?;
    let image = base64::decode_image(&request.image, "image")?;

    let lines = detector.detect(image).await?;

    Ok(Json(ProcessResponse {
        image: base64::encode_png(&lines)?,
        message: format!("Processed with {}", detector.name()),
    }))
}

/// POST /api/process/segment
pub async fn process_segment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessSegmentRequest>,
) -> Result<Json<ProcessResponse>> {
    let image = base64::decode_image(&request.image, "image")?;
    let segmented = state.gate.segment(image).await?;

    Ok(Json(ProcessResponse {
        image: base64::encode_png(&segmented)?,
        message: "Semantic segmentation complete".to_string(),
    }))
}

/// GET /api/process/methods
pub async fn methods(State(state): State<Arc<AppState>>) -> Json<MethodsResponse> {
    Json(MethodsResponse {
        methods: state.detectors.methods(),
    })
}
