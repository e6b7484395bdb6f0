//! Per-user conversation context.
//!
//! A user is mid-conversation exactly when an entry exists for them.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait::async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<Value>;
    /// Replaces any previous context for the user.
    async fn set(&self, user_id: &str, context: Value);
    /// Absent users are a no-op.
    async fn clear(&self, user_id: &str);
}

/// Process-lifetime store. Entries never expire; last write wins.
#[derive(Default)]
pub struct InMemoryContextStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, user_id: &str) -> Option<Value> {
        self.entries.lock().await.get(user_id).cloned()
    }

    async fn set(&self, user_id: &str, context: Value) {
        self.entries
            .lock()
            .await
            .insert(user_id.to_string(), context);
    }

    async fn clear(&self, user_id: &str) {
        self.entries.lock().await.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextStore, InMemoryContextStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_user_has_no_context() {
        let store = InMemoryContextStore::new();
        assert!(store.get("nobody").await.is_none());
    }

    #[tokio::test]
    async fn set_replaces_instead_of_merging() {
        let store = InMemoryContextStore::new();
        store.set("u", json!({ "a": 1 })).await;
        store.set("u", json!({ "b": 2 })).await;
        assert_eq!(store.get("u").await, Some(json!({ "b": 2 })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = InMemoryContextStore::new();
        store.set("u", json!({ "a": 1 })).await;
        store.clear("u").await;
        store.clear("u").await;
        assert!(store.get("u").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_writers_on_distinct_users_all_land() {
        let store = Arc::new(InMemoryContextStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.set(&format!("user-{i}"), json!({ "n": i })).await;
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }
        assert_eq!(store.len().await, 16);
        assert_eq!(store.get("user-7").await, Some(json!({ "n": 7 })));
    }
}
