//! Main entry point for the sketch generation gateway

use sketch_gateway::{
    api,
    config::Settings,
    engine::{EngineVariant, HttpEngine, InferenceEngine},
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "pretty" {
        registry.with(fmt::layer()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }

    info!(
        host = %settings.server.host,
        port = settings.server.port,
        concurrency = ?settings.engine.concurrency,
        "Starting sketch generation gateway"
    );

    let standard: Arc<dyn InferenceEngine> =
        Arc::new(HttpEngine::new(EngineVariant::Standard, &settings.engines.standard)?);
    let accelerated: Arc<dyn InferenceEngine> =
        Arc::new(HttpEngine::new(EngineVariant::Accelerated, &settings.engines.accelerated)?);

    let state = Arc::new(AppState::new(settings, standard, accelerated));

    if state.gate.load_all().await {
        info!("Both engine handles loaded");
    } else {
        warn!("Serving in degraded mode until the engines load");
    }

    state.monitor.start(state.settings.engine.probe_interval_secs).await;

    let app = api::create_router(state.clone());

    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    state.monitor.stop().await;
    Ok(())
}
