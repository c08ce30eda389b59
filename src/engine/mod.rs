//! Engine module - inference boundary, HTTP worker client, gate, and monitor

pub mod detectors;
pub mod gate;
pub mod http_engine;
pub mod monitor;
pub mod traits;

pub use gate::{draw_seed, EngineGate, GateStats, MAX_SEED};
pub use http_engine::HttpEngine;
pub use monitor::EngineMonitor;
pub use traits::{EngineVariant, InferParams, InferenceEngine};
