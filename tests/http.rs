mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::registry;
use rest_scaffold::http::{DispatchOptions, RequestInfo};
use rest_scaffold::{app, app_with_options, AppConfig, AppState, MemoryProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router() -> Router {
    let provider = Arc::new(MemoryProvider::new(registry()));
    app(AppState::new(provider), &AppConfig::default())
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn alice() -> Value {
    json!({ "email": "alice@example.io", "username": "alice", "password": "secret" })
}

#[tokio::test]
async fn status_is_online() {
    let (status, body) = send(&router(), request(Method::GET, "/api/v1/status", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Online");
    assert!(body["date"].is_string());
}

#[tokio::test]
async fn create_then_read_and_list() {
    let app = router();
    let (status, created) = send(&app, request(Method::POST, "/api/v1/user", Some(alice()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["username"], "alice");

    let (status, read) = send(&app, request(Method::GET, "/api/v1/user/1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["email"], "alice@example.io");

    let (status, page) = send(&app, request(Method::GET, "/api/v1/user?username=alice&page=1&limit=10", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["rows"][0]["username"], "alice");
}

#[tokio::test]
async fn invalid_input_is_412_with_field_errors() {
    let (status, body) = send(
        &router(),
        request(Method::POST, "/api/v1/user", Some(json!({ "email": "nope" }))),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["message"], "Validation error with \"User\"");
    assert_eq!(
        body["errors"],
        json!([
            { "code": "User.email.format.error", "field": "email", "value": "email" },
            { "code": "User.username.notNull.error", "field": "username" }
        ])
    );
}

#[tokio::test]
async fn missing_record_is_404() {
    let (status, body) = send(&router(), request(Method::GET, "/api/v1/user/7", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "message": "User not found",
            "errors": [{ "code": "User.id.notFound.error", "field": "id", "value": 7 }]
        })
    );
}

#[tokio::test]
async fn update_of_missing_record_is_404() {
    let (status, _) = send(
        &router(),
        request(Method::PUT, "/api/v1/user/7", Some(json!({ "username": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_is_404_with_url() {
    let (status, body) = send(&router(), request(Method::GET, "/api/v1/nowhere?x=1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "path not found");
    assert_eq!(body["errors"][0]["code"], "path.url.notFound.error");
    assert_eq!(body["errors"][0]["value"], "/api/v1/nowhere?x=1");
}

#[tokio::test]
async fn update_then_delete() {
    let app = router();
    send(&app, request(Method::POST, "/api/v1/user", Some(alice()))).await;

    let (status, updated) = send(
        &app,
        request(Method::PUT, "/api/v1/user/1", Some(json!({ "username": "alicia" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["username"], "alicia");

    let (status, body) = send(&app, request(Method::DELETE, "/api/v1/user/1", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, request(Method::GET, "/api/v1/user/1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/user")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn templater_wraps_success_bodies() {
    let provider = Arc::new(MemoryProvider::new(registry()));
    let options = DispatchOptions {
        templater: Some(Arc::new(|info: &RequestInfo, body: Value| {
            json!({ "path": info.uri.path(), "data": body })
        })),
        ..Default::default()
    };
    let app = app_with_options(AppState::new(provider), &AppConfig::default(), options);
    let (status, body) = send(&app, request(Method::GET, "/api/v1/user", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "path": "/api/v1/user", "data": { "count": 0, "rows": [] } }));
}
