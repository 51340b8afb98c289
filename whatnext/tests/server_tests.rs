#![cfg(feature = "server")]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use whatnext::reasoning::{RunScript, ScriptedEngine};
use whatnext::server::{router, AppState};

fn app(engine: Arc<ScriptedEngine>) -> Router {
    router(Arc::new(AppState {
        services: common::services(engine),
    }))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_status_endpoint() {
    let (status, body) = send(app(Arc::new(ScriptedEngine::new())), Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_nearby_accepts_repeated_categories() {
    let uri = format!(
        "/nearby_locations?latitude={}&longitude={}&categories=bars&categories=cafes&sort_by=review_count",
        common::CENTER_LAT,
        common::CENTER_LON
    );
    let (status, body) = send(app(Arc::new(ScriptedEngine::new())), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["business_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["cafes-0002", "bars-0001", "cafes-0001"]);
    assert!(body.as_array().unwrap().iter().all(|l| l["cur_open"] == 0));
}

#[tokio::test]
async fn test_nearby_rejects_unknown_sort() {
    let (status, body) = send(
        app(Arc::new(ScriptedEngine::new())),
        Method::GET,
        "/nearby_locations?sort_by=distance",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("distance"));
}

#[tokio::test]
async fn test_user_info_for_unknown_user_is_not_found() {
    let (status, body) = send(
        app(Arc::new(ScriptedEngine::new())),
        Method::POST,
        "/user_info",
        Some(json!({"user_id": "user-9999"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found");
}

#[tokio::test]
async fn test_user_info_returns_profile() {
    let (status, body) = send(
        app(Arc::new(ScriptedEngine::new())),
        Method::POST,
        "/user_info",
        Some(json!({"user_id": "user-0001"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Sam");
}

#[tokio::test]
async fn test_tags_info_for_unknown_user_is_empty() {
    let (status, body) = send(
        app(Arc::new(ScriptedEngine::new())),
        Method::POST,
        "/tags_info",
        Some(json!({"user_id": "user-9999"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"user_id": "user-9999", "activities_tag": [], "food_and_drinks_tag": []})
    );
}

#[tokio::test]
async fn test_update_tags_round_trip() {
    let app = app(Arc::new(ScriptedEngine::new()));

    let (status, _) = send(
        app.clone(),
        Method::POST,
        "/update_tags",
        Some(json!({"user_id": "user-0001"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app.clone(),
        Method::POST,
        "/update_tags",
        Some(json!({"user_id": "user-9999", "food_and_drinks_tag": ["tacos"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/update_tags",
        Some(json!({"user_id": "user-0001", "food_and_drinks_tag": ["tacos"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"operation": true, "user_id": "user-0001"}));

    let (_, tags) = send(
        app,
        Method::POST,
        "/tags_info",
        Some(json!({"user_id": "user-0001"})),
    )
    .await;
    assert_eq!(tags["food_and_drinks_tag"], json!(["tacos"]));
    assert_eq!(tags["activities_tag"], json!(["hiking"]));
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let engine = Arc::new(ScriptedEngine::new());
    let (status, body) = send(
        app(engine.clone()),
        Method::POST,
        "/chatgpt_response",
        Some(json!({
            "user_id": "user-0001",
            "message": "",
            "latitude": common::CENTER_LAT,
            "longitude": common::CENTER_LON
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
    assert_eq!(engine.threads_created(), 0);
}

#[tokio::test]
async fn test_chat_regular_reply() {
    let engine = Arc::new(ScriptedEngine::with_scripts([
        RunScript::new().completes_with("Hi! Hungry or looking for something to do?"),
    ]));
    let (status, body) = send(
        app(engine),
        Method::POST,
        "/chatgpt_response",
        Some(json!({
            "user_id": "user-0001",
            "session_id": "session-abc",
            "message": "hello",
            "latitude": common::CENTER_LAT,
            "longitude": common::CENTER_LON
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "user_id": "user-0001",
            "session_id": "session-abc",
            "content": "Hi! Hungry or looking for something to do?",
            "chat_type": "regular",
            "is_user_message": "false"
        })
    );
}
