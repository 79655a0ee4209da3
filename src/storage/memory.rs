//! In-memory key-value storage with an optional size quota

use super::KeyValueStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process storage backed by a `HashMap`.
///
/// When a quota is set, the combined byte length of all keys and values may
/// not exceed it; a write that would is rejected with
/// [`Error::QuotaExceeded`] and leaves the previous value in place.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store limited to `limit` bytes of keys plus values
    pub fn with_quota(limit: usize) -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            quota: Some(limit),
        }
    }

    /// Bytes currently used by keys and values
    pub async fn used_bytes(&self) -> usize {
        self.items
            .read()
            .await
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write().await;

        if let Some(limit) = self.quota {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > limit {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.items.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
