//! Change notifications.
//!
//! Observers subscribe to learn that a key changed and refresh whatever they
//! derived from it. Delivery is best effort: a lagging receiver loses old events.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::backend::Backend;

/// Buffered events per subscriber before the oldest are dropped
pub const EVENT_CAPACITY: usize = 64;

/// A change applied to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEvent {
    /// A fresh value was written
    Set { backend: Backend, key: String },
    /// A key was removed explicitly
    Removed { backend: Backend, key: String },
    /// An entry was dropped because it expired or failed to decode
    Evicted { backend: Backend, key: String },
    /// Every registered key of a backend was cleared
    Cleared { backend: Backend },
}

impl CacheEvent {
    /// Key the event is about, None for whole-backend events.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key, .. }
            | CacheEvent::Removed { key, .. }
            | CacheEvent::Evicted { key, .. } => Some(key),
            CacheEvent::Cleared { .. } => None,
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            CacheEvent::Set { backend, .. }
            | CacheEvent::Removed { backend, .. }
            | CacheEvent::Evicted { backend, .. }
            | CacheEvent::Cleared { backend } => *backend,
        }
    }
}

/// Fan-out of cache events.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(CacheEvent::Cleared {
            backend: Backend::Durable,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(CacheEvent::Set {
            backend: Backend::Session,
            key: "profile".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key(), Some("profile"));
        assert_eq!(event.backend(), Backend::Session);
    }

    #[test]
    fn test_event_serialization() {
        let event = CacheEvent::Removed {
            backend: Backend::Durable,
            key: "k".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"removed","backend":"durable","key":"k"}"#
        );
    }
}
