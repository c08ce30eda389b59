//! Health and service info

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::{EngineVariant, GateStats};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub standard: bool,
    pub accelerated: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_ready: bool,
    pub engines: EngineStatus,
    pub gate: GateStats,
    pub catalog_types: usize,
    pub active_sessions: usize,
    pub generating_sessions: usize,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
}

/// GET /health
///
/// `healthy` only once both engine handles are loaded; always answers.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engine_ready = state.gate.engine_ready();

    Json(HealthResponse {
        status: if engine_ready { "healthy" } else { "degraded" },
        engine_ready,
        engines: EngineStatus {
            standard: state.gate.is_ready(EngineVariant::Standard),
            accelerated: state.gate.is_ready(EngineVariant::Accelerated),
        },
        gate: state.gate.stats(),
        catalog_types: state.catalog.types().len(),
        active_sessions: state.sessions.len(),
        generating_sessions: state.sessions.generating_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /
pub async fn root() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
