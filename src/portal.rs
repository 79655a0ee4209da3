//! Portal context: the single store + notifier pair handed to callers

use crate::config::ClientDeskConfig;
use crate::notifier::ChangeNotifier;
use crate::records::RecordStore;
use crate::storage::{open_storage, KeyValueStore};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Owns the record store and the change notifier.
///
/// Build one per process and pass it (or its handles) to whatever needs
/// data access; there is no global state behind it.
#[derive(Clone)]
pub struct PortalContext {
    store: Arc<RecordStore>,
    notifier: Arc<ChangeNotifier>,
}

impl PortalContext {
    /// Create a context over an existing storage backend
    pub fn new(storage: Arc<dyn KeyValueStore>, poll_interval: Duration) -> Self {
        Self {
            store: Arc::new(RecordStore::new(storage)),
            notifier: Arc::new(ChangeNotifier::new(poll_interval)),
        }
    }

    /// Open the configured storage backend and build a context on it
    pub async fn from_config(config: &ClientDeskConfig) -> Result<Self> {
        config.validate()?;
        let storage = open_storage(&config.storage).await?;
        tracing::debug!(
            backend = ?config.storage.backend,
            dir = %config.storage.dir.display(),
            "Opened portal storage"
        );
        Ok(Self::new(
            storage,
            Duration::from_millis(config.notifier.poll_interval_ms),
        ))
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Start polling the project state through this context's store
    pub fn start_polling(&self) -> Result<()> {
        self.notifier.start_polling(self.store.clone())
    }

    /// Stop polling. Returns `false` if it was not running.
    pub fn stop_polling(&self) -> bool {
        self.notifier.stop_polling()
    }
}
