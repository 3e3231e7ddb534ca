mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{album, orchestrator, radio, wait_for, FakeEngine};
use deck_daemon::http::{router, HttpState};
use deck_daemon::orchestrator::Orchestrator;
use deck_daemon::surface::{JsonFaceRenderer, VirtualDeck};
use deck_daemon::synchronizer::{ButtonSynchronizer, SyncOptions};
use deck_proto::config::Config;
use deck_proto::protocol::PlayerState;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn setup() -> (Arc<Orchestrator>, Router) {
    let engine = FakeEngine::new().shared();
    let orch = orchestrator(vec![radio("r1"), album("a1", 2)], &engine);
    let state = HttpState::new(Arc::clone(&orch), Arc::new(Config::default()));
    (orch, router(state))
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_status_starts_stopped() {
    let (_orch, app) = setup();
    let (code, body) = call(&app, "GET", "/api/status").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["current_media"], Value::Null);
}

#[tokio::test]
async fn test_media_listing() {
    let (_orch, app) = setup();
    let (code, body) = call(&app, "GET", "/api/media").await;
    assert_eq!(code, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "r1");
    assert_eq!(items[1]["id"], "a1");
    assert_eq!(items[1]["track_count"], 2);
}

#[tokio::test]
async fn test_play_and_stop() {
    let (orch, app) = setup();
    let (code, body) = call(&app, "POST", "/api/play/r1").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["ok"], true);
    wait_for(&orch, |s| s.state == PlayerState::Playing).await;

    // commands also answer GET
    let (code, _) = call(&app, "GET", "/api/stop").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(orch.status().await.state, PlayerState::Stopped);
}

#[tokio::test]
async fn test_play_errors_map_to_status_codes() {
    let (_orch, app) = setup();

    let (code, body) = call(&app, "POST", "/api/play/missing").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (code, _) = call(&app, "POST", "/api/play/a1/9").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = call(&app, "POST", "/api/play/a1/2").await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn test_volume_is_clamped() {
    let (orch, app) = setup();
    let (code, _) = call(&app, "POST", "/api/volume/1.7").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(orch.status().await.volume, 1.0);

    let (code, _) = call(&app, "POST", "/api/volume/NaN").await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pause_without_playback_conflicts() {
    let (_orch, app) = setup();
    let (code, body) = call(&app, "POST", "/api/pause").await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);

    let (code, _) = call(&app, "POST", "/api/next").await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deck_routes_without_deck() {
    let (_orch, app) = setup();
    let (code, _) = call(&app, "POST", "/api/navigate/next").await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    let (code, _) = call(&app, "GET", "/api/deck").await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deck_routes() {
    let engine = FakeEngine::new().shared();
    let orch = orchestrator(vec![radio("r1"), radio("r2"), radio("r3"), radio("r4")], &engine);
    let deck = VirtualDeck::new("test", 6);
    let handle = ButtonSynchronizer::new(
        Arc::clone(&orch),
        Arc::new(deck.clone()),
        Arc::new(JsonFaceRenderer),
        SyncOptions::default(),
    )
    .spawn()
    .unwrap();
    let state = HttpState::new(Arc::clone(&orch), Arc::new(Config::default()))
        .with_deck(handle.control(), Some(deck.clone()));
    let app = router(state);

    let (code, _) = call(&app, "POST", "/api/navigate/sideways").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = call(&app, "POST", "/api/navigate/next").await;
    assert_eq!(code, StatusCode::OK);

    let mut faces = Value::Null;
    for _ in 0..200 {
        let (_, body) = call(&app, "GET", "/api/deck").await;
        faces = body;
        if faces[0]["label"] == "R2" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(faces.as_array().map(Vec::len), Some(6));
    assert_eq!(faces[0]["label"], "R2");

    let (code, _) = call(&app, "POST", "/api/deck/keys/0/press").await;
    assert_eq!(code, StatusCode::OK);
    let status = wait_for(&orch, |s| s.state == PlayerState::Playing).await;
    assert!(status.is_current("r2"));

    let (code, _) = call(&app, "POST", "/api/deck/keys/9/press").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    handle.close(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_reload_rebuilds_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.media.catalog_file = dir.path().join("media.toml");
    config.media.music_dir = dir.path().join("music");

    let engine = FakeEngine::new().shared();
    let orch = orchestrator(vec![radio("r1")], &engine);
    let app = router(HttpState::new(Arc::clone(&orch), Arc::new(config)));
    let mut events = orch.catalog().subscribe();

    let (code, _) = call(&app, "POST", "/api/media/reload").await;
    assert_eq!(code, StatusCode::OK);
    assert!(events.try_recv().is_ok());

    let (_, body) = call(&app, "GET", "/api/media").await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["sr_p1", "sr_p2", "sr_p3"]);
    assert!(dir.path().join("media.toml").exists());
}
