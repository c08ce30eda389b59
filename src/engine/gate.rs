//! Serialized access to the engine handles

use image::DynamicImage;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::catalog::prompts;
use crate::config::{ConcurrencyPolicy, EngineGateConfig};
use crate::engine::traits::{EngineVariant, InferParams, InferenceEngine};
use crate::error::{AppError, Result};
use crate::generation::{GenerationRequest, GenerationResult};
use crate::imaging::transform;

/// Largest seed handed to the engine; seeds span the non-negative `i64` range.
pub const MAX_SEED: u64 = i64::MAX as u64;

const EXAMPLE_NEGATIVE_PROMPT: &str = "realistic, colors, detailed, writing, text";
const EXAMPLE_STEPS: u32 = 7;
const EXAMPLE_GUIDANCE: f32 = 0.7;
const EXAMPLE_STRENGTH: f32 = 0.9;
const EXAMPLE_IP_SCALE: f32 = 0.2;

/// Draw a seed uniformly from `[0, MAX_SEED]`
pub fn draw_seed() -> u64 {
    rand::thread_rng().gen_range(0..=MAX_SEED)
}

/// One engine handle with its exclusive-access permit
struct EngineSlot {
    variant: EngineVariant,
    engine: Arc<dyn InferenceEngine>,
    permits: Arc<Semaphore>,
    ready: AtomicBool,
}

/// Gate statistics
#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub pending: u64,
    pub processed: u64,
    pub policy: ConcurrencyPolicy,
}

/// Decrements the pending counter however the call ends, including
/// cancellation of the waiting future.
struct PendingGuard(Arc<AtomicU64>);

impl PendingGuard {
    fn enter(counter: Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Owns the standard and accelerated engine handles.
///
/// At most one call runs against a handle at any instant. Waiting callers
/// are queued on a fair semaphore, so they are served in arrival order and
/// never dropped. Under [`ConcurrencyPolicy::Global`] both handles share one
/// permit.
///
/// A permit is returned only when the engine call itself returns. Callers
/// that go away (aborted session, dropped request, timeout) stop waiting for
/// the result but keep the handle busy until the engine is done.
pub struct EngineGate {
    standard: EngineSlot,
    accelerated: EngineSlot,
    policy: ConcurrencyPolicy,
    working_size: (u32, u32),
    example_reference: PathBuf,
    timeout: Option<Duration>,
    pending: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
}

impl EngineGate {
    pub fn new(
        config: &EngineGateConfig,
        standard: Arc<dyn InferenceEngine>,
        accelerated: Arc<dyn InferenceEngine>,
    ) -> Self {
        let standard_permits = Arc::new(Semaphore::new(1));
        let accelerated_permits = match config.concurrency {
            ConcurrencyPolicy::Global => standard_permits.clone(),
            ConcurrencyPolicy::PerEngine => Arc::new(Semaphore::new(1)),
        };

        Self {
            standard: EngineSlot {
                variant: EngineVariant::Standard,
                engine: standard,
                permits: standard_permits,
                ready: AtomicBool::new(false),
            },
            accelerated: EngineSlot {
                variant: EngineVariant::Accelerated,
                engine: accelerated,
                permits: accelerated_permits,
                ready: AtomicBool::new(false),
            },
            policy: config.concurrency,
            working_size: (config.working_width, config.working_height),
            example_reference: config.example_reference.clone(),
            timeout: config.inference_timeout_secs.map(Duration::from_secs),
            pending: Arc::new(AtomicU64::new(0)),
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    fn slot(&self, variant: EngineVariant) -> &EngineSlot {
        match variant {
            EngineVariant::Standard => &self.standard,
            EngineVariant::Accelerated => &self.accelerated,
        }
    }

    /// Fixed `(width, height)` every conditioning image is resampled to
    pub fn working_size(&self) -> (u32, u32) {
        self.working_size
    }

    /// The raw engine behind a handle, for health probing
    pub fn engine(&self, variant: EngineVariant) -> Arc<dyn InferenceEngine> {
        self.slot(variant).engine.clone()
    }

    pub fn is_ready(&self, variant: EngineVariant) -> bool {
        self.slot(variant).ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, variant: EngineVariant, ready: bool) {
        self.slot(variant).ready.store(ready, Ordering::Release);
    }

    /// True only once both handles are loaded and serving
    pub fn engine_ready(&self) -> bool {
        EngineVariant::ALL.iter().all(|v| self.is_ready(*v))
    }

    fn ensure_ready(&self, variant: EngineVariant) -> Result<()> {
        if self.is_ready(variant) {
            Ok(())
        } else {
            Err(AppError::EngineUnavailable(variant))
        }
    }

    /// Load one handle's weights and mark it ready on success
    pub async fn load(&self, variant: EngineVariant) -> Result<()> {
        let (result, elapsed) = self
            .run_exclusive(variant, "load", |engine| async move { engine.load().await })
            .await;

        match result {
            Ok(()) => {
                self.set_ready(variant, true);
                info!(
                    engine = %variant,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Engine loaded"
                );
                Ok(())
            }
            Err(e) => {
                warn!(engine = %variant, error = %e, "Engine failed to load");
                Err(e)
            }
        }
    }

    /// Eagerly load both handles. Failures are logged, never fatal.
    pub async fn load_all(&self) -> bool {
        for variant in EngineVariant::ALL {
            let _ = self.load(variant).await;
        }
        self.engine_ready()
    }

    /// Run a normalized generation request against the handle it selects.
    ///
    /// The request's style reference travels with the engine call and is
    /// released when that call returns, not when the caller stops waiting.
    pub async fn infer(&self, request: GenerationRequest) -> Result<GenerationResult> {
        let variant = request.variant();
        self.ensure_ready(variant)?;

        let seed = request.seed.unwrap_or_else(draw_seed);
        let reference = request.reference;
        let params = InferParams {
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            images: [request.line_image, request.color_image],
            steps: request.steps,
            guidance_scale: request.cfg,
            seed,
            ip_scale: request.ip_strength,
            ip_image_path: reference.path().to_path_buf(),
            cn_strengths: [request.cn_strength_line, request.cn_strength_seg],
            eta: Some(request.eta),
            strength: None,
        };

        let (image, elapsed) = self
            .run_exclusive(variant, "infer", |engine| async move {
                let image = engine.infer(params).await;
                drop(reference);
                image
            })
            .await;

        Ok(GenerationResult {
            image: image?,
            seed_used: seed,
            latency_seconds: elapsed.as_secs_f64(),
        })
    }

    /// Preview a type with the fixed example recipe, binarized.
    ///
    /// Always runs on the standard handle.
    pub async fn infer_example(&self, type_index: usize, seed: Option<u64>) -> Result<(DynamicImage, u64)> {
        let variant = EngineVariant::Standard;
        self.ensure_ready(variant)?;

        let seed = seed.unwrap_or_else(draw_seed);
        let (width, height) = self.working_size;
        let canvas = transform::blank_canvas(width, height);

        let params = InferParams {
            prompt: prompts::example_prompt(type_index).to_string(),
            negative_prompt: EXAMPLE_NEGATIVE_PROMPT.to_string(),
            images: [canvas.clone(), canvas],
            steps: EXAMPLE_STEPS,
            guidance_scale: EXAMPLE_GUIDANCE,
            seed,
            ip_scale: EXAMPLE_IP_SCALE,
            ip_image_path: self.example_reference.clone(),
            cn_strengths: [0.0, 0.0],
            eta: None,
            strength: Some(EXAMPLE_STRENGTH),
        };

        let (image, _) = self
            .run_exclusive(variant, "example", |engine| async move { engine.infer(params).await })
            .await;

        Ok((transform::binarize(&image?), seed))
    }

    pub async fn upscale(&self, image: DynamicImage, prompt: String, resolution: u32) -> Result<DynamicImage> {
        let variant = EngineVariant::Standard;
        self.ensure_ready(variant)?;

        let (result, _) = self
            .run_exclusive(variant, "upscale", move |engine| async move {
                engine.upscale(image, prompt, resolution).await
            })
            .await;
        result
    }

    pub async fn load_detector(&self, method: u8) -> Result<()> {
        let variant = EngineVariant::Standard;
        self.ensure_ready(variant)?;

        let (result, _) = self
            .run_exclusive(variant, "load_detector", move |engine| async move {
                engine.load_detector(method).await
            })
            .await;
        result
    }

    pub async fn detect_lines(&self, image: DynamicImage, method: u8) -> Result<DynamicImage> {
        let variant = EngineVariant::Standard;
        self.ensure_ready(variant)?;

        let (result, _) = self
            .run_exclusive(variant, "detect_lines", move |engine| async move {
                engine.detect_lines(image, method).await
            })
            .await;
        result
    }

    pub async fn segment(&self, image: DynamicImage) -> Result<DynamicImage> {
        let variant = EngineVariant::Standard;
        self.ensure_ready(variant)?;

        let (result, _) = self
            .run_exclusive(variant, "segment", |engine| async move { engine.segment(image).await })
            .await;
        result
    }

    /// Wait for the handle's permit, then run `call` on a task that owns it.
    ///
    /// Returns the call's result together with the time spent inside the
    /// permit. No retry: a failed call is reported as-is. Dropping the
    /// returned future, or hitting the timeout, detaches the caller only;
    /// the permit is held until `call` completes.
    async fn run_exclusive<T, F, Fut>(
        &self,
        variant: EngineVariant,
        operation: &'static str,
        call: F,
    ) -> (Result<T>, Duration)
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn InferenceEngine>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let slot = self.slot(variant);
        let pending = PendingGuard::enter(self.pending.clone());

        let permit = match slot.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return (
                    Err(AppError::Internal("Engine permit was closed".to_string())),
                    Duration::ZERO,
                )
            }
        };

        debug!(engine = %variant, operation, "Acquired engine permit");
        let engine = slot.engine.clone();
        let processed = self.processed.clone();

        let mut task = tokio::spawn(async move {
            let started = Instant::now();
            let result = call(engine).await;
            let elapsed = started.elapsed();

            processed.fetch_add(1, Ordering::Relaxed);
            drop(permit);
            drop(pending);
            debug!(
                engine = %variant,
                operation,
                elapsed_secs = elapsed.as_secs_f64(),
                ok = result.is_ok(),
                "Released engine permit"
            );
            (result, elapsed)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        engine = %variant,
                        operation,
                        limit_secs = limit.as_secs(),
                        "Engine call timed out; handle stays busy until it returns"
                    );
                    return (
                        Err(AppError::Timeout(format!(
                            "{} on {} exceeded {}s",
                            operation,
                            variant,
                            limit.as_secs()
                        ))),
                        limit,
                    );
                }
            },
            None => task.await,
        };

        match joined {
            Ok((result, elapsed)) => (result.map_err(AppError::into_engine_error), elapsed),
            Err(e) => (
                Err(AppError::Engine(format!("{} on {} did not complete: {}", operation, variant, e))),
                Duration::ZERO,
            ),
        }
    }

    /// Get the number of calls waiting for or holding a permit
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Get the number of completed engine calls
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Get gate statistics
    pub fn stats(&self) -> GateStats {
        GateStats {
            pending: self.pending_count(),
            processed: self.processed_count(),
            policy: self.policy,
        }
    }
}
