//! Sketch Generation Gateway
//!
//! Exposes a single exclusive image-generation engine to many concurrent
//! callers, over plain HTTP and over a streaming WebSocket session, with a
//! reference-style catalog and two engine configurations (standard and
//! accelerated).

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod imaging;
pub mod session;
pub mod storage;

pub use error::{AppError, Result};

use std::sync::Arc;

use catalog::StyleCatalog;
use config::Settings;
use engine::detectors::DetectorRegistry;
use engine::{EngineGate, EngineMonitor, InferenceEngine};
use generation::{GenerationOrchestrator, RequestNormalizer};
use session::ConnectionRegistry;
use storage::ExportStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub catalog: Arc<StyleCatalog>,
    pub gate: Arc<EngineGate>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub detectors: Arc<DetectorRegistry>,
    pub sessions: Arc<ConnectionRegistry>,
    pub exports: Arc<ExportStore>,
    pub monitor: Arc<EngineMonitor>,
}

impl AppState {
    /// Wire every component around the two engine handles.
    ///
    /// Builds the catalog from disk; engines are not loaded here.
    pub fn new(
        settings: Settings,
        standard: Arc<dyn InferenceEngine>,
        accelerated: Arc<dyn InferenceEngine>,
    ) -> Self {
        let catalog = Arc::new(StyleCatalog::build(
            &settings.catalog.root,
            &settings.catalog.image_extension,
        ));
        let gate = Arc::new(EngineGate::new(&settings.engine, standard, accelerated));
        let normalizer = RequestNormalizer::new(catalog.clone(), gate.working_size(), settings.storage.temp_dir());
        let orchestrator = Arc::new(GenerationOrchestrator::new(normalizer, gate.clone()));

        Self {
            detectors: Arc::new(DetectorRegistry::with_defaults(gate.clone())),
            sessions: Arc::new(ConnectionRegistry::new()),
            exports: Arc::new(ExportStore::new(settings.storage.export_dir.clone())),
            monitor: Arc::new(EngineMonitor::new(gate.clone())),
            catalog,
            gate,
            orchestrator,
            settings,
        }
    }
}
