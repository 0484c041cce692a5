//! Shared helpers for driving the full router in integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mm_service::config::Config;
use mm_service::repositories::init_schema;
use mm_service::routes::{build_routes, AppState};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

/// Build the application against an in-memory database with default
/// configuration.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(HashMap::new()).await
}

/// Build the application with configuration overrides.
pub async fn spawn_app_with(vars: HashMap<String, String>) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let config = Config::from_vars(&vars).unwrap();
    let state = AppState::new(pool.clone(), config);

    TestApp {
        router: build_routes(state),
        pool,
    }
}

/// Insert an account row, e.g. `("acme", "paid")`.
pub async fn seed_account(pool: &SqlitePool, account_code: &str, status: &str) {
    sqlx::query("INSERT INTO accounts (account_code, status) VALUES (?1, ?2)")
        .bind(account_code)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}

/// Send a JSON request and return status plus parsed body (Null for an
/// empty body).
pub async fn request(
    app: &TestApp,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(json.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn post(app: &TestApp, path: &str, body: Value) -> (StatusCode, Value) {
    request(app, "POST", path, Some(body)).await
}

pub async fn get(app: &TestApp, path: &str) -> (StatusCode, Value) {
    request(app, "GET", path, None).await
}

/// A minimal valid register body for a dynamic session.
pub fn register_body(code: &str, sdp: &str) -> Value {
    serde_json::json!({
        "code": code,
        "offer": {"type": "offer", "sdp": sdp}
    })
}

/// A register body claiming a fixed device code for an account.
pub fn fixed_register_body(code: &str, account: &str, sdp: &str) -> Value {
    serde_json::json!({
        "code": code,
        "clientId": account,
        "isService": true,
        "offer": {"type": "offer", "sdp": sdp},
        "iceCandidates": [{"candidate": "candidate:1", "sdpMid": "0", "sdpMLineIndex": 0}]
    })
}
