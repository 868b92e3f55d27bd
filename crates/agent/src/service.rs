//! Conversation-level service over the coordinator.
//!
//! Loads surviving history from the injected session store, runs exactly
//! one round at a time per conversation, and persists whatever survived
//! back with a TTL. Different conversations proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use copperkite_core::error::Error;
use copperkite_core::turn::Turn;
use copperkite_session::SessionStore;

use crate::coordinator::{Coordinator, RoundOutcome};

/// One assistant over many conversations.
pub struct AssistantService {
    coordinator: Coordinator,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    /// Per-conversation round locks: a second message for the same
    /// conversation waits until the current round completes.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AssistantService {
    pub fn new(coordinator: Coordinator, store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            coordinator,
            store,
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user message for the given conversation.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<RoundOutcome, Error> {
        let lock = self.conversation_lock(conversation_id).await;
        let _round_guard = lock.lock().await;

        let key = history_key(conversation_id);
        let mut history: Vec<Turn> = match self.store.get(&key).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        debug!(conversation_id, turns = history.len(), "Loaded history");

        let outcome = self.coordinator.run_round(&mut history, text).await?;

        self.store
            .set(&key, serde_json::to_value(&history)?, Some(self.ttl))
            .await?;
        Ok(outcome)
    }

    /// Drop a conversation's stored history.
    pub async fn forget(&self, conversation_id: &str) -> Result<bool, Error> {
        Ok(self.store.remove(&history_key(conversation_id)).await?)
    }

    async fn conversation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn history_key(conversation_id: &str) -> String {
    format!("history:{conversation_id}")
}
