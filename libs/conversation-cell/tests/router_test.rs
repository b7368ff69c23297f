use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use conversation_cell::{chat_routes, ConversationEngine, InMemoryConversationStore};
use intent_cell::KeywordExtractor;
use shared_utils::test_utils::{test_config, ClinicFixture};

fn app(fixture: &ClinicFixture) -> Router {
    let engine = ConversationEngine::new(
        fixture.store_handle(),
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(KeywordExtractor::new()),
        fixture.clock.clone(),
        &test_config(),
    );
    chat_routes(Arc::new(engine))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bare(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn message_route_returns_reply_options_and_state() {
    let fixture = ClinicFixture::new().await;
    let app = app(&fixture);

    let response = app
        .clone()
        .oneshot(post_json("/chat-7/messages", json!({ "message": "oi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["state"], "IDENTIFY_PATIENT");
    assert_eq!(json["options"]["kind"], "none");
    assert!(json["response_text"].as_str().unwrap().contains("CPF"));

    let response = app.oneshot(bare("GET", "/chat-7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "chat-7");
    assert_eq!(json["state"], "IDENTIFY_PATIENT");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let fixture = ClinicFixture::new().await;
    let response = app(&fixture)
        .oneshot(post_json("/chat-7/messages", json!({ "message": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn attachment_route_records_the_fact() {
    let fixture = ClinicFixture::new().await;
    let app = app(&fixture);

    let response = app
        .clone()
        .oneshot(post_json("/chat-7/attachments", json!({ "file_name": "guia.pdf" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(app.oneshot(bare("GET", "/chat-7")).await.unwrap()).await;
    assert_eq!(json["collected_fields"]["attachment_received"]["value"], true);
}

#[tokio::test]
async fn reaper_routes_list_and_expire() {
    let fixture = ClinicFixture::new().await;
    let app = app(&fixture);

    app.clone()
        .oneshot(post_json("/chat-7/messages", json!({ "message": "oi" })))
        .await
        .unwrap();
    fixture.clock.advance(chrono::Duration::minutes(45));

    let json = body_json(app.clone().oneshot(bare("GET", "/stale?idle_minutes=30")).await.unwrap()).await;
    assert_eq!(json["conversations"], json!(["chat-7"]));

    let response = app.clone().oneshot(bare("DELETE", "/chat-7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.clone().oneshot(bare("DELETE", "/chat-7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.oneshot(bare("GET", "/chat-7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
