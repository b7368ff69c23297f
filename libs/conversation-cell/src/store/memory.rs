use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use shared_database::StoreResult;

use crate::models::Conversation;
use crate::store::ConversationStore;

/// Process-local conversation store for development and tests.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.conversations.write().await.remove(id).is_some())
    }

    async fn list_stale(&self, idle_since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let conversations = self.conversations.read().await;
        let mut ids: Vec<String> = conversations
            .values()
            .filter(|c| c.updated_at < idle_since)
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
