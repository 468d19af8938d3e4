//! HTTP surface tests. The router is driven in-process with
//! `tower::ServiceExt::oneshot`, backed by the memory store and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use tokenkeeper::clock::ManualClock;
use tokenkeeper::config::Config;
use tokenkeeper::models::{TokenPatch, TokenRecord};
use tokenkeeper::registry::TokenRegistry;
use tokenkeeper::store::memory::MemoryStore;
use tokenkeeper::store::{InsertOutcome, RecordStore, StoreResult};
use tokenkeeper::{api, AppState};

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn app_at(start: &str) -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(utc(start)));
    let registry = TokenRegistry::new(Arc::new(MemoryStore::new())).with_clock(clock.clone());
    let state = AppState::new(Arc::new(registry), Config::default());
    (api::router(state), clock)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(app, req).await
}

// ═══════════════════════════════════════════════════════════════════
//  Lifecycle over HTTP
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_register_activate_check_flow() {
    let (app, clock) = app_at("2024-01-15T10:00:00Z");

    let (status, body) = post(&app, "/register", json!({"token": "abc"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token registered");
    assert_eq!(body["created"], true);
    assert_eq!(body["active"], false);

    let (status, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": false, "reason": "inactive"}));

    let (status, body) = post(
        &app,
        "/activate",
        json!({"token": "abc", "durationMonths": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token activated");
    assert_eq!(body["mode"], "timed");
    assert_eq!(body["expireAt"], "2024-02-15T10:00:00.000Z");

    clock.set(utc("2024-02-01T00:00:00Z"));
    let (_, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(
        body,
        json!({"valid": true, "expireAt": "2024-02-15T10:00:00.000Z"})
    );

    clock.set(utc("2024-03-01T00:00:00Z"));
    let (_, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(
        body,
        json!({"valid": false, "reason": "expired", "expireAt": "2024-02-15T10:00:00.000Z"})
    );
}

#[tokio::test]
async fn test_register_twice_reports_existing() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");
    post(&app, "/register", json!({"token": "abc"})).await;

    let (status, body) = post(&app, "/register", json!({"token": "abc"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token already registered");
    assert_eq!(body["created"], false);
}

#[tokio::test]
async fn test_permanent_activation_response() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");
    post(&app, "/register", json!({"token": "vip"})).await;

    let (status, body) = post(
        &app,
        "/activate",
        json!({"token": "vip", "permanent": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token activated permanently");
    assert_eq!(body["mode"], "permanent");
    assert_eq!(body["expireAt"], Value::Null);

    let (_, body) = get(&app, "/cek?token=vip").await;
    assert_eq!(
        body,
        json!({"valid": true, "permanent": true, "expireAt": null})
    );
}

#[tokio::test]
async fn test_deactivate_over_http() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");
    post(&app, "/register", json!({"token": "abc"})).await;
    post(&app, "/activate", json!({"token": "abc", "permanent": true})).await;

    let (status, body) = post(&app, "/deactivate", json!({"token": "abc"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Token deactivated");
    assert_eq!(body["deactivated"], true);

    let (_, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(body["reason"], "inactive");
}

#[tokio::test]
async fn test_client_tokens_lists_newest_first() {
    let (app, clock) = app_at("2024-01-15T10:00:00Z");
    post(&app, "/register", json!({"token": "older"})).await;
    clock.advance(chrono::Duration::hours(1));
    post(&app, "/register", json!({"token": "newer"})).await;

    let (status, body) = get(&app, "/client-tokens").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["token"], "newer");
    assert_eq!(list[1]["token"], "older");
    assert_eq!(list[1]["createdAt"], "2024-01-15T10:00:00.000Z");
    assert_eq!(list[1]["active"], false);
    assert_eq!(list[1]["expireAt"], Value::Null);
}

// ═══════════════════════════════════════════════════════════════════
//  Error mapping
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_missing_token_is_bad_request() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");

    for path in ["/register", "/activate", "/deactivate"] {
        let (status, body) = post(&app, path, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    let (status, _) = post(&app, "/register", json!({"token": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/cek").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");

    let (status, body) = post(
        &app,
        "/activate",
        json!({"token": "ghost", "durationMonths": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "token_not_found");

    let (status, _) = post(&app, "/deactivate", json!({"token": "ghost"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // a validity check answers, it does not fail
    let (status, body) = get(&app, "/cek?token=ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": false, "reason": "not_found"}));
}

#[tokio::test]
async fn test_invalid_duration_is_bad_request() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");
    post(&app, "/register", json!({"token": "abc"})).await;

    for payload in [
        json!({"token": "abc"}),
        json!({"token": "abc", "durationMonths": 0}),
        json!({"token": "abc", "durationMonths": -3}),
        json!({"token": "abc", "durationMonths": 1.5}),
        json!({"token": "abc", "durationMonths": "3"}),
    ] {
        let (status, body) = post(&app, "/activate", payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    let (_, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(body["reason"], "inactive");
}

#[tokio::test]
async fn test_mistyped_body_is_bad_request() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");

    for path in ["/register", "/deactivate"] {
        let (status, body) = post(&app, path, json!({"token": 123})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    let req = Request::builder()
        .method(Method::POST)
        .uri("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");
    let (status, _) = get(&app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════
//  Store outages
// ═══════════════════════════════════════════════════════════════════

/// A store whose every call hangs forever.
struct StalledStore;

#[async_trait]
impl RecordStore for StalledStore {
    async fn find_by_token(&self, _token: &str) -> StoreResult<Option<TokenRecord>> {
        std::future::pending().await
    }

    async fn insert_if_absent(
        &self,
        _token: &str,
        _created_at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        std::future::pending().await
    }

    async fn update_fields(
        &self,
        _token: &str,
        _patch: &TokenPatch,
    ) -> StoreResult<Option<TokenRecord>> {
        std::future::pending().await
    }

    async fn list_all(&self, _order_by_created_desc: bool) -> StoreResult<Vec<TokenRecord>> {
        std::future::pending().await
    }

    async fn ping(&self) -> StoreResult<()> {
        std::future::pending().await
    }
}

fn stalled_app() -> Router {
    let timeout = Duration::from_millis(50);
    let registry = TokenRegistry::new(Arc::new(StalledStore)).with_store_timeout(timeout);
    let config = Config {
        store_timeout: timeout,
        ..Config::default()
    };
    api::router(AppState::new(Arc::new(registry), config))
}

#[tokio::test]
async fn test_stalled_store_maps_to_503() {
    let app = stalled_app();

    let (status, body) = get(&app, "/cek?token=abc").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "store_unavailable");

    let (status, _) = post(&app, "/register", json!({"token": "abc"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ═══════════════════════════════════════════════════════════════════
//  Middleware
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_and_response_headers() {
    let (app, _) = app_at("2024-01-15T10:00:00Z");

    let req = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "req-123");
    assert_eq!(resp.headers()["cache-control"], "no-store");
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");

    let req = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let generated = resp.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}
