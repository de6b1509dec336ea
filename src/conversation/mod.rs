//! Per-user conversation state and the state machine that drives it.

pub mod engine;
pub mod error;
pub mod redis_store;
pub mod replies;

pub use engine::{ConversationEngine, EngineParts, OutboundReply};
pub use error::FlowError;

use crate::models::ListingDraft;
use crate::storage::FolderRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingPhotos,
    AwaitingDeleteKeyword,
    AwaitingDeleteSelection,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitingPhotos => "awaiting_photos",
            Phase::AwaitingDeleteKeyword => "awaiting_delete_keyword",
            Phase::AwaitingDeleteSelection => "awaiting_delete_selection",
        }
    }
}

/// Where one user is in the conversation. A user with no stored state is
/// [`ConversationState::Idle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingPhotos {
        draft: ListingDraft,
    },
    AwaitingDeleteKeyword,
    AwaitingDeleteSelection {
        candidates: Vec<FolderRef>,
    },
}

impl ConversationState {
    pub fn phase(&self) -> Phase {
        match self {
            ConversationState::Idle => Phase::Idle,
            ConversationState::AwaitingPhotos { .. } => Phase::AwaitingPhotos,
            ConversationState::AwaitingDeleteKeyword => Phase::AwaitingDeleteKeyword,
            ConversationState::AwaitingDeleteSelection { .. } => Phase::AwaitingDeleteSelection,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversationStoreError {
    #[error("conversation backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<ConversationState, ConversationStoreError>;

    /// Storing [`ConversationState::Idle`] is the same as [`clear`](Self::clear).
    async fn save(
        &self,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<(), ConversationStoreError>;

    async fn clear(&self, user_id: &str) -> Result<(), ConversationStoreError>;
}

/// Process-lifetime conversation map; a restart puts everyone back to idle.
#[derive(Default)]
pub struct MemoryConversationStore {
    states: Mutex<HashMap<String, ConversationState>>,
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, user_id: &str) -> Result<ConversationState, ConversationStoreError> {
        Ok(self
            .states
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<(), ConversationStoreError> {
        let mut guard = self.states.lock().await;
        if *state == ConversationState::Idle {
            guard.remove(user_id);
        } else {
            guard.insert(user_id.to_string(), state.clone());
        }
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), ConversationStoreError> {
        self.states.lock().await.remove(user_id);
        Ok(())
    }
}

/// One async mutex per user id, so events from the same sender run one at a
/// time while different senders proceed in parallel.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut guard = self.locks.lock().await;
            // Entries nobody holds or waits on only have the map's reference.
            guard.retain(|_, lock| Arc::strong_count(lock) > 1);
            guard.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
