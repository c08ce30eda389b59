//! Wire and normalized forms of generation requests

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::engine::EngineVariant;
use crate::generation::reference::StyleReference;

/// Generation request as received from a client, before validation.
///
/// Numeric fields are kept wide and optional so that out-of-range and
/// negative values reach the normalizer and are reported by field name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGenerateRequest {
    #[serde(default)]
    pub line_image: String,
    #[serde(default)]
    pub color_image: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub type_index: Option<i64>,
    #[serde(default)]
    pub style_index: Option<i64>,
    /// Overrides the catalog style when present
    #[serde(default)]
    pub custom_ref_image: Option<String>,
    #[serde(default)]
    pub steps: Option<i64>,
    #[serde(default)]
    pub cfg: Option<f64>,
    #[serde(default)]
    pub ip_strength: Option<f64>,
    #[serde(default)]
    pub cn_strength_line: Option<f64>,
    #[serde(default)]
    pub cn_strength_seg: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default, alias = "use_hyper")]
    pub use_accelerated: bool,
}

/// Validated generation request, ready for the engine gate
#[derive(Debug)]
pub struct GenerationRequest {
    pub line_image: DynamicImage,
    pub color_image: DynamicImage,
    pub prompt: String,
    pub negative_prompt: String,
    pub type_index: usize,
    pub style_index: usize,
    pub reference: StyleReference,
    pub steps: u32,
    pub cfg: f32,
    pub ip_strength: f32,
    pub cn_strength_line: f32,
    pub cn_strength_seg: f32,
    pub eta: f32,
    /// Drawn by the gate when unset
    pub seed: Option<u64>,
    pub use_accelerated: bool,
}

impl GenerationRequest {
    pub fn variant(&self) -> EngineVariant {
        if self.use_accelerated {
            EngineVariant::Accelerated
        } else {
            EngineVariant::Standard
        }
    }
}

/// Outcome of one generation
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub image: DynamicImage,
    pub seed_used: u64,
    pub latency_seconds: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExampleRequest {
    #[serde(default)]
    pub type_index: Option<i64>,
    #[serde(default)]
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleRequest {
    pub type_index: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUpscaleRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_upscale_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub resolution: Option<i64>,
}

fn default_upscale_prompt() -> String {
    "highest quality".to_string()
}

#[derive(Debug)]
pub struct UpscaleRequest {
    pub image: DynamicImage,
    pub prompt: String,
    pub resolution: u32,
}
