//! Generation pipeline: normalize, run through the gate, release inputs

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::engine::EngineGate;
use crate::error::Result;
use crate::generation::normalizer::RequestNormalizer;
use crate::generation::request::{
    GenerationRequest, GenerationResult, RawExampleRequest, RawGenerateRequest, RawUpscaleRequest,
};

/// Facade over the normalizer and the engine gate.
///
/// Holds no per-request state; a request's temporary inputs live until the
/// engine call that reads them has returned.
pub struct GenerationOrchestrator {
    normalizer: RequestNormalizer,
    gate: Arc<EngineGate>,
}

impl GenerationOrchestrator {
    pub fn new(normalizer: RequestNormalizer, gate: Arc<EngineGate>) -> Self {
        Self { normalizer, gate }
    }

    /// Validate a raw request without touching the engine
    pub fn prepare(&self, raw: &RawGenerateRequest) -> Result<GenerationRequest> {
        self.normalizer.normalize(raw)
    }

    /// Run a prepared request. Consumes it: any temporary reference is
    /// removed once the engine call returns, whatever the outcome.
    ///
    /// `latency_seconds` covers the engine call only; queueing time on the
    /// gate is logged as `total_secs`.
    pub async fn execute(&self, request: GenerationRequest) -> Result<GenerationResult> {
        let variant = request.variant();
        let started = Instant::now();

        let outcome = self.gate.infer(request).await;

        match outcome {
            Ok(result) => {
                info!(
                    engine = %variant,
                    seed = result.seed_used,
                    latency_secs = result.latency_seconds,
                    total_secs = started.elapsed().as_secs_f64(),
                    "Generation completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(engine = %variant, error = %e, "Generation failed");
                Err(e)
            }
        }
    }

    pub async fn generate(&self, raw: &RawGenerateRequest) -> Result<GenerationResult> {
        let request = self.prepare(raw)?;
        self.execute(request).await
    }

    pub async fn generate_example(&self, raw: &RawExampleRequest) -> Result<(DynamicImage, u64)> {
        let request = self.normalizer.normalize_example(raw)?;
        let (image, seed) = self.gate.infer_example(request.type_index, request.seed).await?;
        info!(type_index = request.type_index, seed, "Example sketch generated");
        Ok((image, seed))
    }

    pub async fn upscale(&self, raw: &RawUpscaleRequest) -> Result<DynamicImage> {
        let request = self.normalizer.normalize_upscale(raw)?;
        let image = self
            .gate
            .upscale(request.image, request.prompt, request.resolution)
            .await?;
        info!(resolution = request.resolution, "Upscale completed");
        Ok(image)
    }
}
