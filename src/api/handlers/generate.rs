//! Generation endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::generation::{RawExampleRequest, RawGenerateRequest, RawUpscaleRequest};
use crate::imaging::base64;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub image: String,
    pub seed: u64,
    pub latency: f64,
}

#[derive(Debug, Serialize)]
pub struct ExampleResponse {
    pub image: String,
    pub seed: u64,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub image: String,
}

/// POST /api/generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawGenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let result = state.orchestrator.generate(&raw).await?;

    Ok(Json(GenerateResponse {
        image: base64::encode_png(&result.image)?,
        seed: result.seed_used,
        latency: result.latency_seconds,
    }))
}

/// POST /api/generate/example
pub async fn generate_example(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawExampleRequest>,
) -> Result<Json<ExampleResponse>> {
    let (image, seed) = state.orchestrator.generate_example(&raw).await?;

    Ok(Json(ExampleResponse {
        image: base64::encode_png(&image)?,
        seed,
    }))
}

/// POST /api/generate/upscale
pub async fn upscale(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawUpscaleRequest>,
) -> Result<Json<ImageResponse>> {
    let image = state.orchestrator.upscale(&raw).await?;

    Ok(Json(ImageResponse {
        image: base64::encode_png(&image)?,
    }))
}
