//! Event publishing over a tokio broadcast channel.
//!
//! Business-event producers (membership, billing, support, marketing — all
//! outside this crate) publish finalized domain events here; the router
//! listener fans them out into the delivery ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A finalized domain event offered to the webhook pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub tenant_id: Uuid,
    /// Staff user or system actor that caused the event, when known.
    pub actor_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(tenant_id: Uuid, event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            tenant_id,
            actor_id: None,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Publisher that sends webhook events to a broadcast channel.
#[derive(Clone)]
pub struct EventPublisher {
    sender: tokio::sync::broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the given channel capacity.
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event to all subscribers. Fire-and-forget — errors are
    /// logged but not propagated.
    pub fn publish(&self, event: WebhookEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                target: "webhook_delivery",
                error = %e,
                "No active webhook listener to receive event"
            );
        }
    }

    /// Get a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}
