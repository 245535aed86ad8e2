//! Schema lifecycle events and a fan-out observer.
//!
//! Registration, migration, and exposure may publish events here. Nothing
//! in the core depends on anyone listening: publishing with zero
//! subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by a graphify component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl SchemaEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Migration ─────────────────────────────────────────────
    /// A migration plan was computed.
    MigrationPlanned { actions: usize, fingerprint: String },
    /// A single migration action ran. `created` is false when the
    /// structure already existed (e.g. created by a concurrent run).
    ActionApplied { action: String, created: bool },
    /// A migration action failed; the rest of the plan was skipped.
    MigrationFailed { action: String, error: String },
    /// Plan and hooks finished.
    MigrationCompleted {
        created: usize,
        existing: usize,
        hooks: usize,
        duration_ms: u64,
    },

    // ── Exposure ──────────────────────────────────────────────
    /// A document was written through an exposed resource.
    DocumentWritten { collection: String, key: String },
    /// A document was removed through an exposed resource.
    DocumentDeleted { collection: String, key: String },
}

/// Publish/subscribe fan-out for [`SchemaEvent`]s.
///
/// Clone is cheap; all clones publish to the same subscribers. Slow
/// subscribers lag and lose the oldest events rather than blocking
/// publishers.
#[derive(Debug, Clone)]
pub struct Observer {
    sender: broadcast::Sender<SchemaEvent>,
}

impl Observer {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, payload: EventPayload) -> usize {
        let event = SchemaEvent::new(payload);
        tracing::trace!(event = ?event.payload, "Publishing schema event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchemaEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = SchemaEvent::new(EventPayload::ActionApplied {
            action: "create collection Book".to_string(),
            created: true,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: SchemaEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, deserialized.id);
        assert!(json.contains("\"event_type\":\"ActionApplied\""));
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let observer = Observer::default();
        let delivered = observer.publish(EventPayload::MigrationPlanned {
            actions: 0,
            fingerprint: String::new(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let observer = Observer::new(8);
        let mut a = observer.subscribe();
        let mut b = observer.clone().subscribe();
        assert_eq!(observer.subscriber_count(), 2);

        let payload = EventPayload::DocumentWritten {
            collection: "Book".to_string(),
            key: "b1".to_string(),
        };
        assert_eq!(observer.publish(payload.clone()), 2);

        assert_eq!(a.recv().await.unwrap().payload, payload);
        assert_eq!(b.recv().await.unwrap().payload, payload);
    }
}
