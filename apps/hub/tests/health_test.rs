//! Integration tests for health check endpoints

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::*;
use vibhub_hub::app;

#[tokio::test]
async fn test_simple_health_check() {
    let (status, body) = get(app(test_state()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_liveness_probe() {
    let (status, body) = get_json(app(test_state()), "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("alive"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn test_stats_counts_roles() {
    let state = test_state();
    let device = attach(&state).await;
    let _idle = attach(&state).await;
    state
        .router
        .lock()
        .await
        .registry_mut()
        .register_device(device.id, "lamp", Default::default())
        .unwrap();

    let (status, body) = get_json(app(state), "/health/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sockets"], json!(2));
    assert_eq!(body["registry"]["devices"], json!(1));
    assert_eq!(body["registry"]["unassigned"], json!(1));
    assert_eq!(body["registry"]["rooms"], json!(1));
}

#[tokio::test]
async fn test_unknown_route() {
    let (status, _) = get(app(test_state()), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
