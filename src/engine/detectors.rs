//! Line detector registry with lazy, at-most-once initialisation

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::DynamicImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::engine::gate::EngineGate;
use crate::error::{AppError, Result};
use crate::imaging::transform;

/// Method ids and display names, in wire order
pub const LINE_METHODS: [(u8, &str); 10] = [
    (0, "Sobel Custom"),
    (1, "Canny"),
    (2, "Canny + L2"),
    (3, "Canny + BIL"),
    (4, "Canny + Blur"),
    (5, "RF Custom"),
    (6, "HED"),
    (7, "Lineart"),
    (8, "Lineart Coarse"),
    (9, "PiDiNet"),
];

/// Turns an arbitrary image into a line drawing
#[async_trait]
pub trait LineDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, image: DynamicImage) -> Result<DynamicImage>;
}

/// Builds a detector the first time its method is requested
pub type DetectorLoader = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn LineDetector>>> + Send + Sync>;

/// Wrap an async constructor as a [`DetectorLoader`]
pub fn detector_loader<F, Fut>(load: F) -> DetectorLoader
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn LineDetector>>> + Send + 'static,
{
    Box::new(move || load().boxed())
}

struct DetectorEntry {
    name: String,
    loader: DetectorLoader,
    cell: OnceCell<Arc<dyn LineDetector>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub id: u8,
    pub name: String,
}

/// Sobel gradient computed in-process
pub struct SobelDetector;

#[async_trait]
impl LineDetector for SobelDetector {
    fn name(&self) -> &str {
        "Sobel Custom"
    }

    async fn detect(&self, image: DynamicImage) -> Result<DynamicImage> {
        tokio::task::spawn_blocking(move || transform::sobel_lines(&image))
            .await
            .map_err(|e| AppError::Internal(format!("Sobel worker failed: {}", e)))
    }
}

/// Model-backed detector executed on the standard engine handle
pub struct EngineDetector {
    method: u8,
    name: String,
    gate: Arc<EngineGate>,
}

#[async_trait]
impl LineDetector for EngineDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self, image: DynamicImage) -> Result<DynamicImage> {
        self.gate.detect_lines(image, self.method).await
    }
}

/// Maps a method id to a loader and caches the loaded detector.
///
/// Concurrent first requests for a method share a single initialisation;
/// a failed initialisation is not cached and is retried on the next request.
pub struct DetectorRegistry {
    entries: BTreeMap<u8, DetectorEntry>,
}

impl DetectorRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with the built-in methods: Sobel in-process, the rest on the
    /// standard engine.
    pub fn with_defaults(gate: Arc<EngineGate>) -> Self {
        let mut registry = Self::empty();

        for (id, name) in LINE_METHODS {
            if id == 0 {
                registry.register(
                    id,
                    name,
                    detector_loader(|| async { Ok::<_, AppError>(Arc::new(SobelDetector) as Arc<dyn LineDetector>) }),
                );
                continue;
            }

            let gate = gate.clone();
            registry.register(
                id,
                name,
                detector_loader(move || {
                    let gate = gate.clone();
                    async move {
                        gate.load_detector(id).await?;
                        info!(method = id, name, "Line detector loaded");
                        Ok::<_, AppError>(Arc::new(EngineDetector {
                            method: id,
                            name: name.to_string(),
                            gate,
                        }) as Arc<dyn LineDetector>)
                    }
                }),
            );
        }

        registry
    }

    pub fn register(&mut self, id: u8, name: impl Into<String>, loader: DetectorLoader) {
        self.entries.insert(
            id,
            DetectorEntry {
                name: name.into(),
                loader,
                cell: OnceCell::new(),
            },
        );
    }

    pub fn methods(&self) -> Vec<MethodInfo> {
        self.entries
            .iter()
            .map(|(id, entry)| MethodInfo {
                id: *id,
                name: entry.name.clone(),
            })
            .collect()
    }

    /// Get the detector for `id`, loading it on first use
    pub async fn get(&self, id: u8) -> Result<Arc<dyn LineDetector>> {
        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| AppError::InvalidRequest(format!("Unknown line detection method: {}", id)))?;

        entry
            .cell
            .get_or_try_init(|| (entry.loader)())
            .await
            .cloned()
    }

    pub fn is_loaded(&self, id: u8) -> bool {
        self.entries
            .get(&id)
            .map(|e| e.cell.initialized())
            .unwrap_or(false)
    }
}
