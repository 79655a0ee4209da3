//! Change notifier: subscriber registry plus periodic project polling
//!
//! "Real-time" updates are a fixed-interval re-read of the project state,
//! broadcast to every registered subscriber. Delivery is synchronous and a
//! failing subscriber never blocks the others.
//!
//! ```text
//! interval tick ──► RecordStore::get_project_state ──► notify(ProjectUpdate)
//!                                                        ├─► subscriber A
//!                                                        └─► subscriber B
//! ```

pub mod types;

pub use types::{subscriber, ChangeEvent, Subscriber};

use crate::records::RecordStore;
use crate::{Error, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use types::same_subscriber;

/// Shared set of subscribers
#[derive(Clone, Default)]
struct Registry {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl Registry {
    fn subscribe(&self, callback: Subscriber) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subs.iter().any(|s| same_subscriber(s, &callback)) {
            return false;
        }
        subs.push(callback);
        true
    }

    fn unsubscribe(&self, callback: &Subscriber) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| !same_subscriber(s, callback));
        subs.len() != before
    }

    fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, event: &ChangeEvent) -> usize {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let subs: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for callback in &subs {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(event = event.kind(), "Subscriber failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(event = event.kind(), "Subscriber panicked");
                }
            }
        }
        delivered
    }
}

/// Publish/subscribe hub with an optional polling timer.
///
/// Create one per process (see [`crate::PortalContext`]). Dropping the
/// notifier stops its timer.
pub struct ChangeNotifier {
    registry: Registry,
    poll_interval: Duration,
    polling: Mutex<Option<CancellationToken>>,
}

impl ChangeNotifier {
    /// Create a notifier that polls every `poll_interval` once started
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            registry: Registry::default(),
            poll_interval,
            polling: Mutex::new(None),
        }
    }

    /// Polling period
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Register a subscriber. Returns `false` if it was already registered.
    pub fn subscribe(&self, callback: Subscriber) -> bool {
        self.registry.subscribe(callback)
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, callback: &Subscriber) -> bool {
        self.registry.unsubscribe(callback)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Deliver `event` to every subscriber.
    ///
    /// Subscribers that return an error or panic are logged and skipped.
    /// Returns how many subscribers handled the event successfully.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        self.registry.notify(event)
    }

    /// Start the polling timer on the current tokio runtime.
    ///
    /// The first tick fires one full interval after the call. Fails if a
    /// timer is already running or no runtime is available.
    pub fn start_polling(&self, store: Arc<RecordStore>) -> Result<()> {
        let mut polling = self.polling.lock().unwrap_or_else(PoisonError::into_inner);
        if polling.is_some() {
            return Err(Error::Notifier("Polling already running".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Notifier("Poll interval must be non-zero".to_string()));
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Notifier(format!("No tokio runtime for polling: {}", e)))?;

        let token = CancellationToken::new();
        let registry = self.registry.clone();
        let period = self.poll_interval;
        handle.spawn(run_poll_loop(registry, store, period, token.clone()));

        *polling = Some(token);
        tracing::info!(
            interval_ms = period.as_millis() as u64,
            "Project polling started"
        );
        Ok(())
    }

    /// Stop the polling timer. Returns `false` if none was running.
    pub fn stop_polling(&self) -> bool {
        let token = self
            .polling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!("Project polling stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a polling timer is active
    pub fn is_polling(&self) -> bool {
        self.polling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        if let Some(token) = self
            .polling
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

async fn run_poll_loop(
    registry: Registry,
    store: Arc<RecordStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match store.get_project_state().await {
                    Ok(state) => {
                        let delivered = registry.notify(&ChangeEvent::ProjectUpdate(state));
                        tracing::trace!(delivered, "Project poll delivered");
                    }
                    Err(e) => tracing::warn!("Project poll failed: {}", e),
                }
            }
        }
    }
}
