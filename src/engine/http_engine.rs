//! HTTP client for a co-located inference worker

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::traits::{EngineVariant, InferParams, InferenceEngine};
use crate::error::{AppError, Result};
use crate::imaging::base64;

/// Engine handle backed by an inference worker reachable over HTTP.
///
/// The worker receives reference images by path, so it must run on the
/// same host (or share the temp directory) with the gateway.
pub struct HttpEngine {
    name: String,
    variant: EngineVariant,
    model: String,
    client: Client,
    endpoint: String,
    health_check_path: String,
}

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    model: &'a str,
    variant: EngineVariant,
}

#[derive(Debug, Serialize)]
struct ApiInferRequest<'a> {
    model: &'a str,
    prompt: String,
    negative_prompt: String,
    images: [String; 2],
    num_inference_steps: u32,
    guidance_scale: f32,
    seed: u64,
    ip_scale: f32,
    ip_image_to_use: String,
    cn_strength: [f32; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    eta: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiUpscaleRequest<'a> {
    model: &'a str,
    image: String,
    prompt: String,
    resolution: u32,
}

#[derive(Debug, Serialize)]
struct ApiDetectRequest {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<u8>,
}

#[derive(Debug, Serialize)]
struct ApiDetectorLoadRequest {
    method: u8,
}

/// Image-bearing response from the worker
#[derive(Debug, Deserialize)]
struct ApiImageResponse {
    #[serde(default, alias = "b64_json")]
    image: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStatusResponse {
    #[serde(default)]
    error: Option<String>,
}

impl HttpEngine {
    /// Create a new HTTP engine from configuration
    pub fn new(variant: EngineVariant, config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("{}:{}", variant, config.model),
            variant,
            model: config.model.clone(),
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            health_check_path: config.health_check_path.clone(),
        })
    }

    pub fn variant(&self) -> EngineVariant {
        self.variant
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(engine = %self.name, url = %url, "Sending engine request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Engine(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Engine(format!("Engine returned {}: {}", status, body)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AppError::Engine(format!("Failed to parse engine response: {}", e)))
    }

    async fn post_for_image<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<DynamicImage> {
        let response: ApiImageResponse = self.post(path, body).await?;
        if let Some(error) = response.error {
            return Err(AppError::Engine(error));
        }

        let encoded = response
            .image
            .ok_or_else(|| AppError::Engine("Engine response carried no image".to_string()))?;

        base64::decode_image(&encoded, "image")
            .map_err(|e| AppError::Engine(format!("Engine returned an undecodable image: {}", e)))
    }
}

#[async_trait]
impl InferenceEngine for HttpEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<()> {
        let response: ApiStatusResponse = self
            .post(
                "/load",
                &LoadRequest {
                    model: &self.model,
                    variant: self.variant,
                },
            )
            .await?;

        match response.error {
            Some(error) => Err(AppError::Engine(error)),
            None => Ok(()),
        }
    }

    async fn infer(&self, params: InferParams) -> Result<DynamicImage> {
        let [line, segmentation] = &params.images;
        let request = ApiInferRequest {
            model: &self.model,
            prompt: params.prompt,
            negative_prompt: params.negative_prompt,
            images: [base64::encode_png(line)?, base64::encode_png(segmentation)?],
            num_inference_steps: params.steps,
            guidance_scale: params.guidance_scale,
            seed: params.seed,
            ip_scale: params.ip_scale,
            ip_image_to_use: params.ip_image_path.to_string_lossy().into_owned(),
            cn_strength: params.cn_strengths,
            eta: params.eta,
            strength: params.strength,
        };

        self.post_for_image("/infer", &request).await
    }

    async fn upscale(&self, image: DynamicImage, prompt: String, resolution: u32) -> Result<DynamicImage> {
        let request = ApiUpscaleRequest {
            model: &self.model,
            image: base64::encode_png(&image)?,
            prompt,
            resolution,
        };

        self.post_for_image("/upscale", &request).await
    }

    async fn load_detector(&self, method: u8) -> Result<()> {
        let response: ApiStatusResponse = self
            .post("/detectors/load", &ApiDetectorLoadRequest { method })
            .await?;

        match response.error {
            Some(error) => Err(AppError::Engine(error)),
            None => Ok(()),
        }
    }

    async fn detect_lines(&self, image: DynamicImage, method: u8) -> Result<DynamicImage> {
        let request = ApiDetectRequest {
            image: base64::encode_png(&image)?,
            method: Some(method),
        };

        self.post_for_image("/process/lines", &request).await
    }

    async fn segment(&self, image: DynamicImage) -> Result<DynamicImage> {
        let request = ApiDetectRequest {
            image: base64::encode_png(&image)?,
            method: None,
        };

        self.post_for_image("/process/segment", &request).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}{}", self.endpoint, self.health_check_path);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(engine = %self.name, "Health check passed");
                true
            }
            Ok(response) => {
                debug!(
                    engine = %self.name,
                    status = %response.status(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                debug!(engine = %self.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
