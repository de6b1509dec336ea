use super::{ConversationState, ConversationStore, ConversationStoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

const KEY_PREFIX: &str = "listing:conversation:";

/// Conversation state kept in Redis as JSON, expiring after `ttl_secs` of
/// inactivity so abandoned conversations fall back to idle.
pub struct RedisConversationStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisConversationStore {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    async fn connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, ConversationStoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

fn key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

fn backend(err: redis::RedisError) -> ConversationStoreError {
    ConversationStoreError::Backend(err.to_string())
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn load(&self, user_id: &str) -> Result<ConversationState, ConversationStoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key(user_id)).await.map_err(backend)?;
        let Some(raw) = raw else {
            return Ok(ConversationState::Idle);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(err) => {
                // Unreadable entries read as idle.
                warn!(target = "listing.conversation", user = %user_id, error = %err, "discarding unreadable state");
                Ok(ConversationState::Idle)
            }
        }
    }

    async fn save(
        &self,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<(), ConversationStoreError> {
        if *state == ConversationState::Idle {
            return self.clear(user_id).await;
        }
        let json = serde_json::to_string(state)
            .map_err(|err| ConversationStoreError::Backend(err.to_string()))?;
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key(user_id), json, self.ttl_secs)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), ConversationStoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key(user_id)).await.map_err(backend)?;
        Ok(())
    }
}
