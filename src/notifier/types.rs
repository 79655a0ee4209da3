//! Change notification payloads and subscriber callbacks

use crate::records::ProjectState;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload broadcast to subscribers.
///
/// Serializes as `{"type": "projectUpdate", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ChangeEvent {
    /// Fresh read of the project singleton
    ProjectUpdate(ProjectState),
}

impl ChangeEvent {
    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectUpdate(_) => "projectUpdate",
        }
    }
}

/// Subscriber callback. Identity is the `Arc` allocation, so clones of one
/// `Subscriber` count as the same subscriber.
pub type Subscriber = Arc<dyn Fn(&ChangeEvent) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`Subscriber`]
pub fn subscriber<F>(f: F) -> Subscriber
where
    F: Fn(&ChangeEvent) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Whether two handles refer to the same subscriber
pub(crate) fn same_subscriber(a: &Subscriber, b: &Subscriber) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::default_project;

    #[test]
    fn test_change_event_wire_format() {
        let event = ChangeEvent::ProjectUpdate(default_project());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "projectUpdate");
        assert_eq!(value["data"]["progress"], 75);
        assert_eq!(value["data"]["teamMembers"], 5);
        assert_eq!(event.kind(), "projectUpdate");

        let parsed: ChangeEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_subscriber_identity() {
        let a = subscriber(|_| Ok(()));
        let b = subscriber(|_| Ok(()));
        let a2 = a.clone();
        assert!(same_subscriber(&a, &a2));
        assert!(!same_subscriber(&a, &b));
    }
}
