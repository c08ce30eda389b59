//! Functional tests for serialized engine access

#[path = "../common/mod.rs"]
mod common;

use common::MockEngine;
use image::GenericImageView;
use sketch_gateway::catalog::{prompts, StyleCatalog};
use sketch_gateway::config::{ConcurrencyPolicy, EngineGateConfig};
use sketch_gateway::engine::{EngineGate, EngineMonitor, EngineVariant, MAX_SEED};
use sketch_gateway::error::AppError;
use sketch_gateway::generation::{GenerationRequest, RawGenerateRequest, RequestNormalizer};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _catalog_dir: TempDir,
    _temp_dir: TempDir,
    normalizer: RequestNormalizer,
    gate: Arc<EngineGate>,
    standard: Arc<MockEngine>,
    accelerated: Arc<MockEngine>,
}

async fn harness(policy: ConcurrencyPolicy, standard: MockEngine, accelerated: MockEngine) -> Harness {
    let catalog_dir = common::catalog_fixture();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = EngineGateConfig {
        concurrency: policy,
        working_width: 64,
        working_height: 48,
        ..Default::default()
    };

    let standard = Arc::new(standard);
    let accelerated = Arc::new(accelerated);
    let gate = Arc::new(EngineGate::new(&config, standard.clone(), accelerated.clone()));
    gate.load_all().await;

    let catalog = Arc::new(StyleCatalog::build(catalog_dir.path(), "png"));
    let normalizer = RequestNormalizer::new(catalog, gate.working_size(), temp_dir.path().to_path_buf());

    Harness {
        _catalog_dir: catalog_dir,
        _temp_dir: temp_dir,
        normalizer,
        gate,
        standard,
        accelerated,
    }
}

fn request(h: &Harness, seed: Option<i64>, accelerated: bool) -> GenerationRequest {
    h.normalizer
        .normalize(&RawGenerateRequest {
            line_image: common::png_base64(64, 48),
            color_image: common::png_base64(64, 48),
            seed,
            use_accelerated: accelerated,
            ..Default::default()
        })
        .unwrap()
}

fn assert_no_overlap(calls: &[common::CallRecord]) {
    let mut windows: Vec<_> = calls.iter().map(|c| (c.started, c.finished)).collect();
    windows.sort();
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "engine calls overlapped");
    }
}

#[tokio::test]
async fn test_concurrent_calls_never_overlap() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").with_delay(Duration::from_millis(20)),
        MockEngine::new("accelerated"),
    )
    .await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let gate = h.gate.clone();
        let request = request(&h, Some(i), false);
        handles.push(tokio::spawn(async move { gate.infer(request).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let calls = h.standard.infer_calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(h.standard.max_active(), 1);
    assert_no_overlap(&calls);
    assert_eq!(h.gate.pending_count(), 0);
    assert_eq!(h.gate.processed_count(), 8);
}

#[tokio::test]
async fn test_waiters_served_in_arrival_order() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").with_delay(Duration::from_millis(5)),
        MockEngine::new("accelerated"),
    )
    .await;

    let mut handles = Vec::new();
    for seed in 0..5 {
        let gate = h.gate.clone();
        let request = request(&h, Some(seed), false);
        handles.push(tokio::spawn(async move { gate.infer(request).await }));
        // Stagger arrivals so the queue order is known
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let seeds: Vec<_> = h.standard.infer_calls().iter().map(|c| c.seed.unwrap()).collect();
    assert_eq!(seeds, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_per_engine_policy_lets_handles_overlap() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").blocking(),
        MockEngine::new("accelerated"),
    )
    .await;

    let gate = h.gate.clone();
    let blocked = request(&h, Some(1), false);
    let standard_call = tokio::spawn(async move { gate.infer(blocked).await });
    h.standard.wait_for_entered(1).await;

    let fast = request(&h, Some(2), true);
    let result = tokio::time::timeout(Duration::from_secs(2), h.gate.infer(fast)).await;
    assert!(result.expect("accelerated call should not wait").is_ok());

    h.standard.release(1);
    assert!(standard_call.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_global_policy_serializes_both_handles() {
    let h = harness(
        ConcurrencyPolicy::Global,
        MockEngine::new("standard").blocking(),
        MockEngine::new("accelerated"),
    )
    .await;

    let gate = h.gate.clone();
    let blocked = request(&h, Some(1), false);
    let standard_call = tokio::spawn(async move { gate.infer(blocked).await });
    h.standard.wait_for_entered(1).await;

    let gate = h.gate.clone();
    let queued = request(&h, Some(2), true);
    let accelerated_call = tokio::spawn(async move { gate.infer(queued).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.accelerated.infer_calls().is_empty());
    assert_eq!(h.gate.pending_count(), 2);

    h.standard.release(1);
    assert!(standard_call.await.unwrap().is_ok());
    assert!(accelerated_call.await.unwrap().is_ok());
    assert_eq!(h.accelerated.infer_calls().len(), 1);
}

#[tokio::test]
async fn test_seed_drawn_and_echoed() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard"),
        MockEngine::new("accelerated"),
    )
    .await;

    let first = h.gate.infer(request(&h, None, false)).await.unwrap();
    assert!(first.seed_used <= MAX_SEED);
    assert_eq!(h.standard.infer_calls()[0].seed, Some(first.seed_used));

    let replay = request(&h, Some(first.seed_used as i64), false);
    assert_eq!(replay.seed, Some(first.seed_used));
    let second = h.gate.infer(replay).await.unwrap();
    assert_eq!(second.seed_used, first.seed_used);
    assert_eq!(h.standard.infer_calls()[1].seed, Some(first.seed_used));
}

#[tokio::test]
async fn test_engine_failure_propagates_without_retry() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").failing_infer(),
        MockEngine::new("accelerated"),
    )
    .await;

    let err = h.gate.infer(request(&h, Some(3), false)).await.unwrap_err();
    assert!(matches!(err, AppError::Engine(ref m) if m.contains("CUDA out of memory")));
    assert_eq!(h.standard.infer_calls().len(), 1);
}

#[tokio::test]
async fn test_unloaded_handle_fails_fast() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard"),
        MockEngine::new("accelerated").failing_load(),
    )
    .await;

    assert!(h.gate.is_ready(EngineVariant::Standard));
    assert!(!h.gate.is_ready(EngineVariant::Accelerated));
    assert!(!h.gate.engine_ready());

    let err = h.gate.infer(request(&h, None, true)).await.unwrap_err();
    assert!(matches!(err, AppError::EngineUnavailable(EngineVariant::Accelerated)));
    assert!(h.accelerated.infer_calls().is_empty());
}

#[tokio::test]
async fn test_inference_timeout_keeps_handle_until_call_returns() {
    let standard = Arc::new(MockEngine::new("standard").with_delay(Duration::from_millis(1500)));
    let accelerated = Arc::new(MockEngine::new("accelerated"));
    let config = EngineGateConfig {
        working_width: 64,
        working_height: 48,
        inference_timeout_secs: Some(1),
        ..Default::default()
    };
    let gate = EngineGate::new(&config, standard.clone(), accelerated);
    gate.load_all().await;
    let processed = gate.processed_count();

    let err = gate.upscale(common::split_gray(8, 8), "q".to_string(), 1024).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));

    // The engine is still working: the permit is not back yet
    assert_eq!(gate.pending_count(), 1);
    assert_eq!(gate.processed_count(), processed);

    common::wait_until(|| gate.pending_count() == 0).await;
    assert_eq!(gate.processed_count(), processed + 1);
    assert_eq!(standard.calls().len(), 1);
}

#[tokio::test]
async fn test_dropped_caller_does_not_free_the_handle() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").blocking(),
        MockEngine::new("accelerated"),
    )
    .await;

    let gate = h.gate.clone();
    let first = request(&h, Some(1), false);
    let abandoned = tokio::spawn(async move { gate.infer(first).await });
    h.standard.wait_for_entered(1).await;

    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());
    assert_eq!(h.gate.pending_count(), 1);

    let gate = h.gate.clone();
    let second = request(&h, Some(2), false);
    let next = tokio::spawn(async move { gate.infer(second).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.standard.entered(), 1, "second call admitted while the first was running");

    h.standard.release(1);
    h.standard.wait_for_entered(2).await;
    h.standard.release(1);
    assert_eq!(next.await.unwrap().unwrap().seed_used, 2);

    assert_eq!(h.standard.max_active(), 1);
    assert_no_overlap(&h.standard.infer_calls());
    assert_eq!(h.gate.pending_count(), 0);
}

#[tokio::test]
async fn test_example_runs_on_standard_and_is_binary() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard"),
        MockEngine::new("accelerated"),
    )
    .await;

    let (image, seed) = h.gate.infer_example(4, Some(42)).await.unwrap();
    assert_eq!(seed, 42);
    assert_eq!(image.dimensions(), (64, 48));

    for (_, _, pixel) in image.pixels() {
        let [r, g, b, _] = pixel.0;
        assert!(r == g && g == b && (r == 0 || r == 255));
    }
    assert_eq!(image.get_pixel(0, 0).0[0], 0);
    assert_eq!(image.get_pixel(63, 0).0[0], 255);

    let calls = h.standard.infer_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, prompts::example_prompt(4));
    assert!(h.accelerated.infer_calls().is_empty());

    let (_, drawn) = h.gate.infer_example(99, None).await.unwrap();
    assert!(drawn <= MAX_SEED);
    assert_eq!(h.standard.infer_calls()[1].prompt, prompts::EXAMPLE_PROMPTS[0]);
}

#[tokio::test]
async fn test_monitor_marks_unhealthy_and_recovers() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard"),
        MockEngine::new("accelerated"),
    )
    .await;
    let monitor = EngineMonitor::new(h.gate.clone());

    h.standard.set_healthy(false);
    monitor.probe_once().await;
    monitor.probe_once().await;
    assert!(h.gate.is_ready(EngineVariant::Standard));
    monitor.probe_once().await;
    assert!(!h.gate.is_ready(EngineVariant::Standard));
    assert!(h.gate.is_ready(EngineVariant::Accelerated));

    h.standard.set_healthy(true);
    monitor.probe_once().await;
    assert!(!h.gate.is_ready(EngineVariant::Standard));
    monitor.probe_once().await;
    assert!(h.gate.is_ready(EngineVariant::Standard));
}

#[tokio::test]
async fn test_monitor_retries_failed_load() {
    let h = harness(
        ConcurrencyPolicy::PerEngine,
        MockEngine::new("standard").failing_load(),
        MockEngine::new("accelerated"),
    )
    .await;
    let monitor = EngineMonitor::new(h.gate.clone());

    monitor.probe_once().await;
    assert!(!h.gate.is_ready(EngineVariant::Standard));

    h.standard.set_fail_load(false);
    monitor.probe_once().await;
    assert!(h.gate.is_ready(EngineVariant::Standard));
    assert!(monitor.get_status(EngineVariant::Standard).unwrap().loaded);
}
