use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::models::{AttachmentNotice, ChatMessageRequest};
use crate::services::ConversationEngine;

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: i64,
}

fn default_idle_minutes() -> i64 {
    30
}

#[axum::debug_handler]
pub async fn post_message(
    State(engine): State<Arc<ConversationEngine>>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let response = engine.handle_message(&conversation_id, &request.message).await?;
    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn post_attachment(
    State(engine): State<Arc<ConversationEngine>>,
    Path(conversation_id): Path<String>,
    Json(notice): Json<AttachmentNotice>,
) -> Result<Json<Value>, AppError> {
    let response = engine.handle_attachment(&conversation_id, notice).await?;
    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn get_conversation(
    State(engine): State<Arc<ConversationEngine>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let conversation = engine.snapshot(&conversation_id).await?;
    Ok(Json(json!(conversation)))
}

#[axum::debug_handler]
pub async fn list_stale(
    State(engine): State<Arc<ConversationEngine>>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<Value>, AppError> {
    let ids = engine.stale(query.idle_minutes).await?;
    Ok(Json(json!({
        "idle_minutes": query.idle_minutes,
        "conversations": ids,
    })))
}

#[axum::debug_handler]
pub async fn expire_conversation(
    State(engine): State<Arc<ConversationEngine>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !engine.expire(&conversation_id).await? {
        return Err(AppError::NotFound(format!("Conversation {} not found", conversation_id)));
    }
    Ok(Json(json!({ "expired": conversation_id })))
}
