//! Inference engine boundary types and trait

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Which loaded model configuration services a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineVariant {
    Standard,
    Accelerated,
}

impl EngineVariant {
    pub const ALL: [EngineVariant; 2] = [EngineVariant::Standard, EngineVariant::Accelerated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a single engine inference call
#[derive(Debug, Clone)]
pub struct InferParams {
    pub prompt: String,
    pub negative_prompt: String,
    /// Line drawing first, segmentation map second
    pub images: [DynamicImage; 2],
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: u64,
    /// Style-reference strength
    pub ip_scale: f32,
    /// Path of the style reference image on the shared filesystem
    pub ip_image_path: PathBuf,
    /// Conditioning strengths, line first, segmentation second
    pub cn_strengths: [f32; 2],
    pub eta: Option<f32>,
    /// Denoising strength; engine default when unset
    pub strength: Option<f32>,
}

/// A loaded model configuration that turns conditioning inputs into pixels.
///
/// Implementations are not assumed to be re-entrant: callers go through
/// [`EngineGate`](crate::engine::EngineGate), which serializes access.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Get the engine name
    fn name(&self) -> &str;

    /// Load model weights. Called once at startup and retried by the monitor
    /// until it succeeds.
    async fn load(&self) -> Result<()>;

    /// Run one generation
    async fn infer(&self, params: InferParams) -> Result<DynamicImage>;

    /// Tile upscale to the target resolution (long edge)
    async fn upscale(&self, image: DynamicImage, prompt: String, resolution: u32) -> Result<DynamicImage>;

    /// Prepare the line detector for `method`
    async fn load_detector(&self, method: u8) -> Result<()> {
        Err(AppError::Engine(format!(
            "{} does not provide line detector {}",
            self.name(),
            method
        )))
    }

    /// Extract a line drawing with a model-backed detector
    async fn detect_lines(&self, _image: DynamicImage, method: u8) -> Result<DynamicImage> {
        Err(AppError::Engine(format!(
            "{} does not provide line detector {}",
            self.name(),
            method
        )))
    }

    /// Produce a color-coded semantic segmentation map
    async fn segment(&self, _image: DynamicImage) -> Result<DynamicImage> {
        Err(AppError::Engine(format!("{} does not provide segmentation", self.name())))
    }

    /// Check if the engine is reachable and serving
    async fn health_check(&self) -> bool;
}
