//! Validation and defaulting of generation requests

use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::StyleCatalog;
use crate::error::{AppError, Result, ValidationError};
use crate::generation::reference::{StyleReference, TempReference};
use crate::generation::request::{
    ExampleRequest, GenerationRequest, RawExampleRequest, RawGenerateRequest, RawUpscaleRequest,
    UpscaleRequest,
};
use crate::imaging::{base64, transform};

pub const DEFAULT_STEPS: i64 = 8;
pub const DEFAULT_CFG: f64 = 1.5;
pub const DEFAULT_IP_STRENGTH: f64 = 0.8;
pub const DEFAULT_CN_STRENGTH: f64 = 0.8;
pub const DEFAULT_ETA: f64 = 0.6;
pub const DEFAULT_UPSCALE_RESOLUTION: i64 = 2048;

pub const STEPS_RANGE: (i64, i64) = (2, 12);
pub const CFG_RANGE: (f64, f64) = (0.1, 3.0);
pub const STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);
pub const ETA_RANGE: (f64, f64) = (0.1, 1.0);
pub const UPSCALE_RANGE: (i64, i64) = (1024, 4096);

fn check_int(field: &'static str, value: i64, (min, max): (i64, i64)) -> std::result::Result<i64, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::out_of_range(field, min, max, value))
    }
}

fn check_float(field: &'static str, value: f64, (min, max): (f64, f64)) -> std::result::Result<f32, ValidationError> {
    // NaN fails the range check
    if (min..=max).contains(&value) {
        Ok(value as f32)
    } else {
        Err(ValidationError::out_of_range(field, min, max, value))
    }
}

fn check_non_negative(field: &'static str, value: i64) -> std::result::Result<u64, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::out_of_range(field, 0, i64::MAX, value))
}

fn check_index(field: &'static str, value: Option<i64>) -> std::result::Result<usize, ValidationError> {
    let value = value.unwrap_or(0);
    usize::try_from(value).map_err(|_| ValidationError::out_of_range(field, 0, i64::MAX, value))
}

/// Turns raw client requests into validated requests.
///
/// All checks run before anything touches an engine. Images are resampled
/// to the gate's working size; a custom reference is written to a scoped
/// temporary file owned by the returned request.
pub struct RequestNormalizer {
    catalog: Arc<StyleCatalog>,
    working_size: (u32, u32),
    temp_dir: PathBuf,
}

impl RequestNormalizer {
    pub fn new(catalog: Arc<StyleCatalog>, working_size: (u32, u32), temp_dir: PathBuf) -> Self {
        Self {
            catalog,
            working_size,
            temp_dir,
        }
    }

    pub fn normalize(&self, raw: &RawGenerateRequest) -> Result<GenerationRequest> {
        let steps = check_int("steps", raw.steps.unwrap_or(DEFAULT_STEPS), STEPS_RANGE)?;
        let cfg = check_float("cfg", raw.cfg.unwrap_or(DEFAULT_CFG), CFG_RANGE)?;
        let ip_strength = check_float(
            "ip_strength",
            raw.ip_strength.unwrap_or(DEFAULT_IP_STRENGTH),
            STRENGTH_RANGE,
        )?;
        let cn_strength_line = check_float(
            "cn_strength_line",
            raw.cn_strength_line.unwrap_or(DEFAULT_CN_STRENGTH),
            STRENGTH_RANGE,
        )?;
        let cn_strength_seg = check_float(
            "cn_strength_seg",
            raw.cn_strength_seg.unwrap_or(DEFAULT_CN_STRENGTH),
            STRENGTH_RANGE,
        )?;
        let eta = check_float("eta", raw.eta.unwrap_or(DEFAULT_ETA), ETA_RANGE)?;
        let seed = raw.seed.map(|s| check_non_negative("seed", s)).transpose()?;
        let type_index = check_index("type_index", raw.type_index)?;
        let style_index = check_index("style_index", raw.style_index)?;

        let (width, height) = self.working_size;
        let line_image = transform::resize_to(base64::decode_image(&raw.line_image, "line_image")?, width, height);
        let color_image = transform::resize_to(base64::decode_image(&raw.color_image, "color_image")?, width, height);

        let reference = match raw.custom_ref_image.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(encoded) => {
                let image = base64::decode_image(encoded, "custom_ref_image")?;
                StyleReference::Custom(self.write_temp_reference(&image)?)
            }
            None => {
                let entry = self
                    .catalog
                    .lookup(type_index, style_index)
                    .ok_or(ValidationError::UnknownStyle {
                        type_index,
                        style_index,
                    })?;
                StyleReference::Catalog(entry.reference_image_path.clone())
            }
        };

        debug!(
            type_index,
            style_index,
            custom_reference = reference.is_custom(),
            seed = ?seed,
            accelerated = raw.use_accelerated,
            "Normalized generation request"
        );

        Ok(GenerationRequest {
            line_image,
            color_image,
            prompt: raw.prompt.clone(),
            negative_prompt: raw.negative_prompt.clone(),
            type_index,
            style_index,
            reference,
            steps: steps as u32,
            cfg,
            ip_strength,
            cn_strength_line,
            cn_strength_seg,
            eta,
            seed,
            use_accelerated: raw.use_accelerated,
        })
    }

    pub fn normalize_example(&self, raw: &RawExampleRequest) -> Result<ExampleRequest> {
        Ok(ExampleRequest {
            type_index: check_index("type_index", raw.type_index)?,
            seed: raw.seed.map(|s| check_non_negative("seed", s)).transpose()?,
        })
    }

    pub fn normalize_upscale(&self, raw: &RawUpscaleRequest) -> Result<UpscaleRequest> {
        let resolution = check_int(
            "resolution",
            raw.resolution.unwrap_or(DEFAULT_UPSCALE_RESOLUTION),
            UPSCALE_RANGE,
        )?;
        let image = base64::decode_image(&raw.image, "image")?;

        Ok(UpscaleRequest {
            image,
            prompt: raw.prompt.clone(),
            resolution: resolution as u32,
        })
    }

    fn write_temp_reference(&self, image: &DynamicImage) -> Result<TempReference> {
        let resource = |e: String| AppError::Resource(format!("Failed to stage reference image: {}", e));

        let mut file = tempfile::Builder::new()
            .prefix("style_ref_")
            .suffix(".png")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| resource(e.to_string()))?;

        // A failed write drops `file`, which removes it
        image
            .write_to(file.as_file_mut(), ImageFormat::Png)
            .map_err(|e| resource(e.to_string()))?;

        Ok(TempReference::new(file.into_temp_path()))
    }
}
