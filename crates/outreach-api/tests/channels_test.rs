//! Integration tests for the channel routes.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_channel_registration_and_state_changes_round_trip() {
    let app = common::build_test_app();
    let channel_id = Uuid::new_v4();

    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/channels",
        &json!({
            "channel_id": channel_id,
            "name": "Outbound line 1",
            "kind": "voice",
            "connection_state": "connected"
        }),
    )
    .await;
    let (change_status, change) = common::post_json(
        app.clone(),
        &format!("/api/v1/channels/{channel_id}/connection-state"),
        &json!({ "connection_state": "degraded" }),
    )
    .await;
    let (_, view) = common::get_json(app.clone(), &format!("/api/v1/channels/{channel_id}")).await;
    let (_, list) = common::get_json(app, "/api/v1/channels").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["aggregate_id"], json!(channel_id));
    assert_eq!(json["event_ids"].as_array().unwrap().len(), 1);
    assert_eq!(change_status, StatusCode::OK);
    assert_eq!(change["connection_state"], "degraded");
    assert_eq!(view["kind"], "voice");
    assert_eq!(view["connection_state"], "degraded");
    assert_eq!(view["version"], 2);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_changing_to_the_current_state_is_rejected() {
    let app = common::build_test_app();
    let (_, json) = common::post_json(
        app.clone(),
        "/api/v1/channels",
        &json!({ "name": "Line", "kind": "messaging" }),
    )
    .await;
    let channel_id = json["aggregate_id"].as_str().unwrap().to_string();

    let (status, json) = common::post_json(
        app,
        &format!("/api/v1/channels/{channel_id}/connection-state"),
        &json!({ "connection_state": "connected" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_state_change_for_unknown_channel_returns_404() {
    let app = common::build_test_app();

    let (status, _) = common::post_json(
        app,
        &format!("/api/v1/channels/{}/connection-state", Uuid::new_v4()),
        &json!({ "connection_state": "disconnected" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_channel_name_is_rejected() {
    let app = common::build_test_app();

    let (status, _) = common::post_json(
        app,
        "/api/v1/channels",
        &json!({ "name": "  ", "kind": "voice" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
