//! HTTP route table

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{files, generate, health, process, styles};
use crate::session;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let generate_routes = Router::new()
        .route("/", post(generate::generate))
        .route("/example", post(generate::generate_example))
        .route("/upscale", post(generate::upscale))
        .route("/ws", get(session::ws_handler));

    let style_routes = Router::new()
        .route("/types", get(styles::list_types))
        .route("/types/:type_index/prompt", get(styles::type_prompt))
        .route(
            "/types/:type_index/styles/:style_index/prompt",
            get(styles::style_prompt),
        )
        .route("/categories", get(styles::categories));

    let process_routes = Router::new()
        .route("/lines", post(process::process_lines))
        .route("/segment", post(process::process_segment))
        .route("/methods", get(process::methods));

    let file_routes = Router::new()
        .route("/export", post(files::export))
        .route("/download/:filename", get(files::download))
        .route("/cleanup", delete(files::cleanup));

    let static_prefix = state.settings.catalog.static_prefix.trim_end_matches('/').to_string();
    let static_files = ServeDir::new(state.catalog.root());

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .nest("/api/generate", generate_routes)
        .nest("/api/styles", style_routes)
        .nest("/api/process", process_routes)
        .nest("/api/files", file_routes)
        .nest_service(&static_prefix, static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
