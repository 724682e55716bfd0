//! Audit event bus
//!
//! Broadcast channel carrying structured audit events for every mutation the
//! engine applies. Publishing never fails: with no subscribers the event is
//! simply dropped, audit delivery is best-effort and must never block or
//! fail a mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::access::Actor;

/// Buffered events per subscriber before lagging ones are dropped
const CHANNEL_CAPACITY: usize = 256;

/// What the event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntity {
    pub entity_type: String,
    pub id: String,
}

impl AuditEntity {
    pub fn request(id: impl Into<String>) -> Self {
        Self {
            entity_type: "service_request".to_string(),
            id: id.into(),
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    /// Dotted kind, e.g. `request.create` or `sla.update`
    pub kind: String,
    pub actor: Actor,
    pub entity: AuditEntity,
    pub message: String,
    /// Kind-specific details
    pub meta: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        kind: impl Into<String>,
        actor: Actor,
        entity: AuditEntity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            time: Utc::now(),
            kind: kind.into(),
            actor,
            entity,
            message: message.into(),
            meta: serde_json::Value::Null,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Fan-out bus for audit events
pub struct AuditBus {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to a fresh bus
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: AuditEvent) {
        tracing::debug!(kind = %event.kind, entity = %event.entity.id, "audit");
        // No receivers is fine, the event is dropped.
        let _ = self.sender.send(event);
    }

    /// Subscribe to the stream from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = AuditBus::new();
        let mut rx = bus.subscribe();
        bus.publish(AuditEvent::new(
            "request.create",
            Actor::system(),
            AuditEntity::request("CST-2026-0001"),
            "created",
        ));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "request.create");
        assert_eq!(event.entity.id, "CST-2026-0001");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = AuditBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(AuditEvent::new(
            "request.delete",
            Actor::staff("op-1"),
            AuditEntity::request("CST-2026-0002"),
            "deleted",
        ));
    }
}
