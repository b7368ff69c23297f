use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::ConversationEngine;

/// Patient chat plus the hooks an external reaper uses to expire sessions.
pub fn chat_routes(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/stale", get(handlers::list_stale))
        .route(
            "/{conversation_id}",
            get(handlers::get_conversation).delete(handlers::expire_conversation),
        )
        .route("/{conversation_id}/messages", post(handlers::post_message))
        .route("/{conversation_id}/attachments", post(handlers::post_attachment))
        .with_state(engine)
}
