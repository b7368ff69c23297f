pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shared_database::StoreResult;

use crate::models::Conversation;

pub use memory::InMemoryConversationStore;
pub use supabase::SupabaseConversationStore;

/// Conversation snapshots keyed by session id.
///
/// Expiry belongs to an external reaper, which uses `list_stale` and
/// `delete`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: &str) -> StoreResult<Option<Conversation>>;
    /// Insert or overwrite the snapshot.
    async fn save(&self, conversation: &Conversation) -> StoreResult<()>;
    /// `true` when a conversation was removed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;
    /// Ids of conversations not updated since `idle_since`.
    async fn list_stale(&self, idle_since: DateTime<Utc>) -> StoreResult<Vec<String>>;
}
