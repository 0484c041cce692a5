//! Integration tests for fixed device codes, heartbeats and the operator
//! code API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use common::{fixed_register_body, get, post, spawn_app};
use serde_json::json;

#[tokio::test]
async fn test_fixed_registration_has_no_expiry() {
    let app = spawn_app().await;

    let (status, body) = post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], "FIX01");
    assert_eq!(body["isFixedCode"], true);
    assert!(body["expiresInMillis"].is_null());
}

#[tokio::test]
async fn test_fixed_registration_requires_client_id() {
    let app = spawn_app().await;

    let (status, body) = post(
        &app,
        "/register",
        json!({
            "code": "FIX01",
            "isService": true,
            "offer": {"type": "offer", "sdp": "O1"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_fixed_code_ownership_conflict() {
    let app = spawn_app().await;

    let (status, _) = post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;
    assert_eq!(status, StatusCode::CREATED);

    // Another account cannot claim the same code.
    let (status, body) = post(
        &app,
        "/register",
        fixed_register_body("FIX01", "globex", "O2"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "code_in_use");

    // The owner can re-register and the payload is updated in place.
    let (status, _) = post(&app, "/register", fixed_register_body("FIX01", "acme", "O3")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = get(&app, "/resolve?code=FIX01").await;
    assert_eq!(body["offer"]["sdp"], "O3");
}

#[tokio::test]
async fn test_dynamic_register_cannot_take_foreign_fixed_code() {
    let app = spawn_app().await;

    post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;

    let (status, body) = post(
        &app,
        "/register",
        json!({"code": "fix01", "offer": {"type": "offer", "sdp": "O2"}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "code_in_use");
}

#[tokio::test]
async fn test_heartbeat_success_and_validation() {
    let app = spawn_app().await;
    post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;

    let (status, body) = post(&app, "/heartbeat", json!({"code": "fix01"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Unknown codes are fine; hosts heartbeat through restarts.
    let (status, _) = post(&app, "/heartbeat", json!({"code": "NOPE99"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, "/heartbeat", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_takes_device_offline() {
    let app = spawn_app().await;
    post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;

    let (status, body) = post(&app, "/disconnect", json!({"code": "FIX01"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Offline devices do not resolve.
    let (status, _) = get(&app, "/resolve?code=FIX01").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A heartbeat brings the device back online.
    post(&app, "/heartbeat", json!({"code": "FIX01"})).await;
    let (status, body) = get(&app, "/resolve?code=FIX01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offer"]["sdp"], "O1");
}

#[tokio::test]
async fn test_generate_code_defaults_and_validation() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/generate-code").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(body["code"].as_str().unwrap().len(), 6);

    let (status, body) = get(&app, "/api/generate-code?length=8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"].as_str().unwrap().len(), 8);

    let (status, _) = get(&app, "/api/generate-code?length=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_code_reports_owner() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/check-code?code=FIX01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert!(body.get("owner").is_none());

    post(&app, "/register", fixed_register_body("FIX01", "acme", "O1")).await;

    let (status, body) = get(&app, "/api/check-code?code=fix01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "FIX01");
    assert_eq!(body["available"], false);
    assert_eq!(body["owner"], "acme");

    let (status, _) = get(&app, "/api/check-code").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_code_sees_dynamic_sessions() {
    let app = spawn_app().await;

    post(
        &app,
        "/register",
        json!({"code": "ABC123", "offer": {"type": "offer", "sdp": "O1"}}),
    )
    .await;

    let (_, body) = get(&app, "/api/check-code?code=abc123").await;
    assert_eq!(body["available"], false);
    assert!(body.get("owner").is_none());
}
