//! Functional tests for the streaming session protocol

#[path = "../common/mod.rs"]
mod common;

use common::MockEngine;
use serde_json::json;
use sketch_gateway::session::{ServerMessage, Session, SessionState};
use sketch_gateway::AppState;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    _catalog: TempDir,
    work: TempDir,
    state: Arc<AppState>,
    standard: Arc<MockEngine>,
}

async fn harness(standard: MockEngine) -> Harness {
    let catalog = common::catalog_fixture();
    let work = tempfile::tempdir().unwrap();
    let standard = Arc::new(standard);
    let state = common::loaded_state(
        common::test_settings(catalog.path(), work.path()),
        standard.clone(),
        Arc::new(MockEngine::new("accelerated")),
    )
    .await;

    Harness {
        _catalog: catalog,
        work,
        state,
        standard,
    }
}

fn open(h: &Harness) -> (Session, UnboundedReceiver<ServerMessage>) {
    Session::open(h.state.orchestrator.clone(), h.state.sessions.clone())
}

fn generate_text(data: serde_json::Value) -> String {
    json!({"type": "generate", "data": data}).to_string()
}

async fn next(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session message")
        .expect("session channel closed")
}

async fn wait_for_state(session: &Session, expected: SessionState) {
    for _ in 0..500 {
        if session.state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {:?}", expected);
}

#[tokio::test]
async fn test_generate_emits_progress_then_result() {
    let h = harness(MockEngine::new("standard")).await;
    let (session, mut rx) = open(&h);

    session.handle_text(&generate_text(common::generate_body()));

    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());
    match next(&mut rx).await {
        ServerMessage::Result { image, seed, latency } => {
            assert!(!image.is_empty());
            assert_eq!(Some(seed), h.standard.infer_calls()[0].seed);
            assert!(latency >= 0.0);
        }
        other => panic!("expected result, got {:?}", other),
    }

    wait_for_state(&session, SessionState::Open).await;
}

#[tokio::test]
async fn test_ping_answered_while_generating() {
    let h = harness(MockEngine::new("standard").blocking()).await;
    let (session, mut rx) = open(&h);

    session.handle_text(&generate_text(common::generate_body()));
    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());
    h.standard.wait_for_entered(1).await;

    session.handle_text(r#"{"type":"ping"}"#);
    assert_eq!(next(&mut rx).await, ServerMessage::Pong);
    assert_eq!(session.state(), SessionState::Generating);

    h.standard.release(1);
    assert!(matches!(next(&mut rx).await, ServerMessage::Result { .. }));
}

#[tokio::test]
async fn test_validation_error_keeps_session_open() {
    let h = harness(MockEngine::new("standard")).await;
    let (session, mut rx) = open(&h);

    let mut body = common::generate_body();
    body["steps"] = json!(40);
    session.handle_text(&generate_text(body));

    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    match next(&mut rx).await {
        ServerMessage::Error { message } => assert!(message.contains("steps")),
        other => panic!("expected error, got {:?}", other),
    }
    wait_for_state(&session, SessionState::Open).await;
    assert!(h.standard.infer_calls().is_empty());

    session.handle_text(&generate_text(common::generate_body()));
    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());
    assert!(matches!(next(&mut rx).await, ServerMessage::Result { .. }));
}

#[tokio::test]
async fn test_engine_error_keeps_session_open() {
    let h = harness(MockEngine::new("standard").failing_infer()).await;
    let (session, mut rx) = open(&h);

    session.handle_text(&generate_text(common::generate_body()));
    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());
    match next(&mut rx).await {
        ServerMessage::Error { message } => assert!(message.contains("CUDA out of memory")),
        other => panic!("expected error, got {:?}", other),
    }

    wait_for_state(&session, SessionState::Open).await;
    session.handle_text(r#"{"type":"ping"}"#);
    assert_eq!(next(&mut rx).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_second_generate_while_busy_is_rejected() {
    let h = harness(MockEngine::new("standard").blocking()).await;
    let (session, mut rx) = open(&h);

    session.handle_text(&generate_text(common::generate_body()));
    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());

    session.handle_text(&generate_text(common::generate_body()));
    assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));

    h.standard.release(1);
    assert!(matches!(next(&mut rx).await, ServerMessage::Result { .. }));
    assert_eq!(h.standard.infer_calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_message_yields_error() {
    let h = harness(MockEngine::new("standard")).await;
    let (session, mut rx) = open(&h);

    session.handle_text(r#"{"type":"subscribe"}"#);
    assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));

    session.handle_text("{{{");
    assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));

    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_close_cancels_generation_and_cleans_up() {
    let h = harness(MockEngine::new("standard").blocking()).await;
    let (session, mut rx) = open(&h);

    let mut body = common::generate_body();
    body["custom_ref_image"] = json!(common::png_base64(16, 16));
    session.handle_text(&generate_text(body));

    assert_eq!(next(&mut rx).await, ServerMessage::starting());
    assert_eq!(next(&mut rx).await, ServerMessage::generating());
    h.standard.wait_for_entered(1).await;
    assert_eq!(common::temp_files(h.work.path()).len(), 1);

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(h.state.sessions.len(), 0);

    // The engine call runs to completion before its reference goes away
    assert_eq!(common::temp_files(h.work.path()).len(), 1);
    h.standard.release(1);
    common::wait_for_no_temp_files(h.work.path()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nothing follows the cancelled generation
    while let Ok(message) = rx.try_recv() {
        assert!(!message.is_terminal(), "message after close: {:?}", message);
    }
}

#[tokio::test]
async fn test_drop_closes_session() {
    let h = harness(MockEngine::new("standard")).await;
    let (first, _rx1) = open(&h);
    let (second, _rx2) = open(&h);
    assert_eq!(h.state.sessions.len(), 2);

    drop(first);
    assert_eq!(h.state.sessions.len(), 1);
    assert_eq!(second.state(), SessionState::Open);
}

#[tokio::test]
async fn test_sessions_share_the_engine_without_interleaving() {
    let h = harness(MockEngine::new("standard").with_delay(Duration::from_millis(20))).await;

    let mut sessions = Vec::new();
    for _ in 0..3 {
        let (session, rx) = open(&h);
        session.handle_text(&generate_text(common::generate_body()));
        sessions.push((session, rx));
    }

    for (_, rx) in sessions.iter_mut() {
        assert_eq!(next(rx).await, ServerMessage::starting());
        assert_eq!(next(rx).await, ServerMessage::generating());
        assert!(matches!(next(rx).await, ServerMessage::Result { .. }));
    }

    let mut windows: Vec<_> = h.standard.infer_calls().iter().map(|c| (c.started, c.finished)).collect();
    windows.sort();
    assert_eq!(windows.len(), 3);
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0);
    }
}
