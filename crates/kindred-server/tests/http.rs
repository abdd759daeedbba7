use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use kindred_api::{AppStateInner, router};
use kindred_db::Database;
use kindred_gateway::hub::NotificationHub;
use kindred_gateway::registry::RoomRegistry;
use kindred_push::DisabledPush;
use kindred_types::models::ChatMessage;

fn test_app() -> (Router, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (bridge_tx, _bridge_rx) = tokio::sync::mpsc::unbounded_channel();
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        hub: NotificationHub::spawn(),
        push: Arc::new(DisabledPush),
        rooms: RoomRegistry::new(db.clone(), bridge_tx),
    });
    (router(state), db)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn send_rejects_missing_fields_with_400() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(post_json(
            "/notifications/send",
            serde_json::json!({ "userId": "u1", "title": "T" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn send_then_history_round_trip() {
    let (app, _db) = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/notifications/send",
            serde_json::json!({ "userId": "u1", "title": "T", "body": "B" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["notification"]["userId"], "u1");
    assert_eq!(body["notification"]["type"], "system");
    assert_eq!(body["notification"]["isRead"], false);

    let response = app
        .oneshot(
            Request::get("/notifications/history?userId=u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["title"], "T");
}

#[tokio::test]
async fn notification_history_requires_user_id() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(
            Request::get("/notifications/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn broadcast_acknowledges_before_fan_out() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(post_json(
            "/notifications/broadcast",
            serde_json::json!({ "title": "T", "body": "B" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn token_registration_persists() {
    let (app, db) = test_app();
    let response = app
        .oneshot(post_json(
            "/notifications/fcm/register",
            serde_json::json!({ "userId": "u1", "token": "tok-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(db.push_token("u1").unwrap().as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn mark_read_acks_even_for_unknown_ids() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(post_json(
            "/notifications/read",
            serde_json::json!({ "notificationId": "does-not-exist" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn chat_history_is_chronological() {
    let (app, db) = test_app();
    for (i, content) in ["first", "second", "third"].iter().enumerate() {
        db.insert_chat_message(&ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: "wellness".to_string(),
            user_name: "ana".to_string(),
            user_id: Some("u1".to_string()),
            user_avatar: None,
            content: content.to_string(),
            created_at: 1000 + i as i64,
        })
        .unwrap();
    }

    let response = app
        .oneshot(
            Request::get("/room/wellness/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let history = body_json(response).await;
    let contents: Vec<_> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let (app, _db) = test_app();
    let response = app
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
