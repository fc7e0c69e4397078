//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use outreach_core::clock::Clock;
use outreach_core::repository::EventRepository;
use outreach_dispatch::{DispatchConfig, DispatchEngine, InMemoryContactRegistry};
use outreach_event_store::memory_event_repository::InMemoryEventRepository;
use outreach_test_support::{FixedClock, MockRng, ScriptedChannelDriver};
use tower::ServiceExt;

use outreach_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over an in-memory event store and a scripted
/// channel driver. Uses the same route structure as `main.rs`.
pub fn build_test_app() -> Router {
    build_test_app_with_driver(Arc::new(ScriptedChannelDriver::new())).0
}

/// Like [`build_test_app`], returning the driver and engine for assertions.
pub fn build_test_app_with_driver(
    driver: Arc<ScriptedChannelDriver>,
) -> (Router, Arc<DispatchEngine>) {
    let clock = fixed_clock();
    let event_repository: Arc<dyn EventRepository> = Arc::new(InMemoryEventRepository::new());
    let engine = Arc::new(DispatchEngine::new(
        event_repository.clone(),
        clock.clone(),
        Box::new(MockRng),
        driver,
        DispatchConfig::default(),
    ));
    let app_state = AppState::new(
        clock,
        event_repository,
        engine.clone(),
        Arc::new(InMemoryContactRegistry::new()),
    );
    (outreach_api::app(app_state), engine)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a request with a JSON body and return the response.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, "POST", uri, body).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}
