//! Key-value storage backends
//!
//! Records are persisted as JSON text under string keys, mirroring a
//! browser's local storage. Two backends are provided:
//!
//! - [`MemoryStorage`]: in-process map with an optional byte quota
//! - [`FileStorage`]: one `<key>.json` file per key, written atomically

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Flat string key-value store holding JSON-encoded values.
///
/// Writes replace the whole value under a key; there is no partial update
/// and no conflict detection.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// List all keys currently stored, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Build the storage backend selected by `config`.
pub async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            let storage = match config.quota_bytes {
                Some(limit) => MemoryStorage::with_quota(limit),
                None => MemoryStorage::new(),
            };
            Ok(Arc::new(storage))
        }
        StorageBackend::File => {
            let storage = FileStorage::new(config.dir.clone()).await?;
            Ok(Arc::new(storage))
        }
    }
}
