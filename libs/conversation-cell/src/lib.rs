pub mod handlers;
pub mod models;
pub mod prompts;
pub mod router;
pub mod services;
pub mod store;

pub use models::*;
pub use router::chat_routes;
pub use services::ConversationEngine;
pub use store::{ConversationStore, InMemoryConversationStore, SupabaseConversationStore};
