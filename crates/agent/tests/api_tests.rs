//! Integration tests for the agent API endpoints

#[allow(dead_code)]
#[path = "../src/api.rs"]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use netpulse_lib::{
    health::{components, HealthRegistry},
    observability::AgentMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = AgentMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_source_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::COUNTER_SOURCE, "1 of 2 interfaces failed")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded is still operational
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["counter_source"]["message"],
        "1 of 2 interfaces failed"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_store_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::SAMPLE_STORE, "failed to append sample")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let (_, health) = get_json(app, "/healthz").await;

    assert!(health["components"].is_object());
    for name in ["poller", "counter_source", "sample_store"] {
        assert!(health["components"][name].is_object(), "missing {}", name);
        assert!(health["components"][name]["last_check"].is_string());
    }
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
    assert!(readiness.get("reason").is_none());
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::POLLER, "shutting down")
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "poller unhealthy: shutting down");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_poll_cycle(Duration::from_millis(3));
    state.metrics.inc_samples_stored();
    state.metrics.inc_source_errors("timeout");
    state.metrics.set_interfaces_configured(2);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("netpulse_samples_stored_total"));
    assert!(metrics_text.contains("netpulse_source_errors_total{kind=\"timeout\"}"));
    assert!(metrics_text.contains("netpulse_interfaces_configured 2"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_poll_cycle(Duration::from_millis(1));
    state.metrics.observe_poll_cycle(Duration::from_millis(40));

    let (_, body) = get(app, "/metrics").await;
    let metrics_text = String::from_utf8(body).unwrap();

    assert!(metrics_text.contains("netpulse_poll_cycle_seconds_bucket"));
    assert!(metrics_text.contains("netpulse_poll_cycle_seconds_count"));
    assert!(metrics_text.contains("netpulse_poll_cycle_seconds_sum"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = get(app, "/interfaces").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
