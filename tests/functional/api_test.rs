//! Functional tests for the HTTP surface

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use common::MockEngine;
use serde_json::{json, Value};
use sketch_gateway::api::create_router;
use sketch_gateway::AppState;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _catalog: TempDir,
    _work: TempDir,
    state: Arc<AppState>,
    standard: Arc<MockEngine>,
}

impl TestApp {
    fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

async fn create_test_app(standard: MockEngine, accelerated: MockEngine) -> TestApp {
    let catalog = common::catalog_fixture();
    let work = tempfile::tempdir().unwrap();
    let standard = Arc::new(standard);
    let state = common::loaded_state(
        common::test_settings(catalog.path(), work.path()),
        standard.clone(),
        Arc::new(accelerated),
    )
    .await;

    TestApp {
        _catalog: catalog,
        _work: work,
        state,
        standard,
    }
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_healthy_when_both_engines_loaded() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (status, body) = send_json(app.router(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["engine_ready"], true);
    assert_eq!(body["catalog_types"], 2);
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["generating_sessions"], 0);
}

#[tokio::test]
async fn test_degraded_startup() {
    let work = tempfile::tempdir().unwrap();
    let settings = common::test_settings(&work.path().join("no-catalog"), work.path());
    let state = common::loaded_state(
        settings,
        Arc::new(MockEngine::new("standard").failing_load()),
        Arc::new(MockEngine::new("accelerated")),
    )
    .await;
    let app = create_router(state);

    let (status, body) = send_json(app.clone(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["engine_ready"], false);
    assert_eq!(body["engines"]["standard"], false);
    assert_eq!(body["engines"]["accelerated"], true);

    let (status, body) = send_json(app.clone(), Method::GET, "/api/styles/types", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["types"], json!([]));

    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/generate",
        Some(json!({
            "line_image": common::png_base64(8, 8),
            "color_image": common::png_base64(8, 8),
            "custom_ref_image": common::png_base64(8, 8),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "engine_not_ready");
}

#[tokio::test]
async fn test_generate_success() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let mut body = common::generate_body();
    body["seed"] = json!(1234);
    let (status, body) = send_json(app.router(), Method::POST, "/api/generate", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"], 1234);
    assert!(body["latency"].as_f64().unwrap() >= 0.0);
    assert!(!body["image"].as_str().unwrap().is_empty());
    assert_eq!(app.standard.infer_calls().len(), 1);
}

#[tokio::test]
async fn test_generate_validation_is_bad_request() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let mut body = common::generate_body();
    body["eta"] = json!(0.05);
    let (status, body) = send_json(app.router(), Method::POST, "/api/generate", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "out_of_range");
    assert_eq!(body["error"]["param"], "eta");
    assert!(app.standard.calls().is_empty());
}

#[tokio::test]
async fn test_generate_unknown_style() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let mut body = common::generate_body();
    body["type_index"] = json!(7);
    let (status, body) = send_json(app.router(), Method::POST, "/api/generate", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "unknown_style");
}

#[tokio::test]
async fn test_engine_failure_is_server_error() {
    let app = create_test_app(
        MockEngine::new("standard").failing_infer(),
        MockEngine::new("accelerated"),
    )
    .await;

    let (status, body) = send_json(app.router(), Method::POST, "/api/generate", Some(common::generate_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["type"], "engine_error");
}

#[tokio::test]
async fn test_example_and_upscale() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (status, body) = send_json(
        app.router(),
        Method::POST,
        "/api/generate/example",
        Some(json!({"type_index": 1, "seed": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"], 9);

    let (status, _) = send_json(
        app.router(),
        Method::POST,
        "/api/generate/upscale",
        Some(json!({"image": common::png_base64(8, 8), "resolution": 512})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        app.router(),
        Method::POST,
        "/api/generate/upscale",
        Some(json!({"image": common::png_base64(8, 8)})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["image"].is_string());
}

#[tokio::test]
async fn test_style_routes() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (_, body) = send_json(app.router(), Method::GET, "/api/styles/types", None).await;
    assert_eq!(body["types"][0]["name"], "a_exterior");
    assert_eq!(body["types"][0]["styles"][0]["image_url"], "/static/styles/a_exterior/brick.png");

    let (_, body) = send_json(app.router(), Method::GET, "/api/styles/types/0/styles/0/prompt", None).await;
    assert_eq!(body["prompt"], "red brick facade");

    let (_, body) = send_json(app.router(), Method::GET, "/api/styles/types/3/prompt?use_simple=true", None).await;
    assert_eq!(body["prompt"], "A city");

    let (_, body) = send_json(app.router(), Method::GET, "/api/styles/types/8/styles/8/prompt", None).await;
    assert_eq!(body["prompt"], "");

    for uri in [
        "/api/styles/types/-1/prompt",
        "/api/styles/types/-1/prompt?use_simple=true",
        "/api/styles/types/0/styles/-3/prompt",
    ] {
        let (status, body) = send_json(app.router(), Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["prompt"], "", "{}", uri);
    }

    let (_, body) = send_json(app.router(), Method::GET, "/api/styles/categories", None).await;
    assert_eq!(body["categories"].as_array().unwrap().len(), 12);
    assert_eq!(body["categories"][4], "int");
    assert_eq!(body["simple_prompts"][3], "A city");
}

#[tokio::test]
async fn test_catalog_images_are_served() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (status, bytes) = send(app.router(), Method::GET, "/static/styles/a_exterior/brick.png", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[tokio::test]
async fn test_process_routes() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (_, body) = send_json(app.router(), Method::GET, "/api/process/methods", None).await;
    let methods = body["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 10);
    assert_eq!(methods[0]["name"], "Sobel Custom");

    let (status, body) = send_json(
        app.router(),
        Method::POST,
        "/api/process/lines",
        Some(json!({"image": common::png_base64(8, 8), "method": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processed with Sobel Custom");
    assert!(app.standard.calls().is_empty());

    let (status, body) = send_json(
        app.router(),
        Method::POST,
        "/api/process/lines",
        Some(json!({"image": common::png_base64(8, 8), "method": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processed with Lineart");
    assert!(app.state.detectors.is_loaded(7));
    assert_eq!(app.standard.calls().len(), 1);

    let (status, _) = send_json(
        app.router(),
        Method::POST,
        "/api/process/lines",
        Some(json!({"image": common::png_base64(8, 8), "method": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_download_cleanup() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (status, body) = send_json(
        app.router(),
        Method::POST,
        "/api/files/export",
        Some(json!({"image": common::png_base64(8, 8), "filename": "render.png"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let url = body["download_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/api/files/download/") && url.ends_with("_render.png"));

    let (status, bytes) = send(app.router(), Method::GET, &url, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));

    let (status, _) = send(app.router(), Method::GET, "/api/files/download/missing.png", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(app.router(), Method::DELETE, "/api/files/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn test_root_info() {
    let app = create_test_app(MockEngine::new("standard"), MockEngine::new("accelerated")).await;

    let (status, body) = send_json(app.router(), Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "sketch-gateway");
}
