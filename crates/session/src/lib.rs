//! # Copperkite Session
//!
//! The injected key/value store used for per-conversation state: surviving
//! turn history, rate-limit counters, anything with a lifetime beyond one
//! round. Always passed in behind the `SessionStore` trait — never hidden
//! module-level mutable state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use copperkite_core::error::SessionError;

/// The session store boundary: get / set-with-optional-TTL / remove.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// A human-readable name for this store.
    fn name(&self) -> &str;

    /// Fetch the value for `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SessionError>;

    /// Store `value` under `key`. A `ttl` of `None` means no expiry.
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), SessionError>;

    /// Remove `key`. Returns whether an entry was present.
    async fn remove(&self, key: &str) -> Result<bool, SessionError>;
}

struct StoredEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An in-memory store with lazy TTL expiry — entries are dropped when read
/// past their deadline, or in bulk via [`purge_expired`].
///
/// [`purge_expired`]: InMemorySessionStore::purge_expired
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Purged expired session entries");
        }
        removed
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SessionError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    return Ok(Some(entry.value.clone()));
                }
                None => return Ok(None),
                Some(_) => {} // expired, fall through to remove
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), SessionError> {
        let entry = StoredEntry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let store = InMemorySessionStore::new();
        store
            .set("conv_1", serde_json::json!({"turns": 3}), None)
            .await
            .unwrap();

        let value = store.get("conv_1").await.unwrap().unwrap();
        assert_eq!(value["turns"], 3);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let store = InMemorySessionStore::new();
        store.set("k", serde_json::json!(1), None).await.unwrap();
        store.set("k", serde_json::json!(2), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = InMemorySessionStore::new();
        store.set("k", serde_json::json!(true), None).await.unwrap();
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_entries() {
        let store = InMemorySessionStore::new();
        store
            .set("k", serde_json::json!("v"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = InMemorySessionStore::new();
        store
            .set("short", serde_json::json!(1), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.set("forever", serde_json::json!(2), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("forever").await.unwrap().is_some());
    }
}
