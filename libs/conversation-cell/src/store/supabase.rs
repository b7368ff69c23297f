use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use shared_database::supabase::{merge_duplicates, return_representation, SupabaseClient};
use shared_database::StoreResult;

use crate::models::Conversation;
use crate::store::ConversationStore;

const TABLE: &str = "/rest/v1/conversations";

/// Conversations as rows of `(id, state, snapshot jsonb, updated_at)`.
pub struct SupabaseConversationStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct SnapshotRow {
    snapshot: Conversation,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

impl SupabaseConversationStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl ConversationStore for SupabaseConversationStore {
    #[instrument(skip(self))]
    async fn load(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let path = format!("{}?id=eq.{}&select=snapshot", TABLE, urlencoding::encode(id));
        let mut rows: Vec<SnapshotRow> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0).snapshot) })
    }

    #[instrument(skip(self, conversation), fields(id = %conversation.id, state = %conversation.state))]
    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        let body = json!({
            "id": conversation.id,
            "state": conversation.state.as_str(),
            "snapshot": serde_json::to_value(conversation)?,
            "updated_at": conversation.updated_at,
        });
        self.supabase
            .execute(Method::POST, TABLE, Some(body), Some(merge_duplicates()))
            .await?;
        debug!("Conversation snapshot stored");
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let path = format!("{}?id=eq.{}", TABLE, urlencoding::encode(id));
        let rows: Vec<IdRow> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_stale(&self, idle_since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let cutoff = idle_since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let path = format!(
            "{}?updated_at=lt.{}&select=id&order=id.asc",
            TABLE,
            urlencoding::encode(&cutoff)
        );
        let rows: Vec<IdRow> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}

