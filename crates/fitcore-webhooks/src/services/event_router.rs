//! Event fan-out: one pending delivery per matching active subscription.
//!
//! The router only writes ledger rows; it never performs HTTP calls. The
//! dispatcher picks the rows up on its next poll.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::matcher;
use crate::services::event_publisher::WebhookEvent;
use fitcore_db::models::{CreateWebhookDelivery, WebhookDelivery, WebhookSubscription};

/// Fans domain events out into the delivery ledger.
#[derive(Clone)]
pub struct EventRouter {
    pool: PgPool,
}

impl EventRouter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create one PENDING delivery per active subscription matching the
    /// event's type, and return the created rows.
    ///
    /// A failed insert is returned to the caller immediately; the router
    /// performs no retries of its own (producers own their at-least-once
    /// guarantees upstream of this call).
    pub async fn route(&self, event: &WebhookEvent) -> Result<Vec<WebhookDelivery>, WebhookError> {
        let subscriptions =
            WebhookSubscription::find_active_by_tenant(&self.pool, event.tenant_id).await?;

        let matching = select_matching(&subscriptions, &event.event_type);

        if matching.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.event_id,
                event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                "No active subscriptions match event type"
            );
            return Ok(Vec::new());
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            subscription_count = matching.len(),
            "Fanning event out to matching subscriptions"
        );

        let mut deliveries = Vec::with_capacity(matching.len());
        for subscription in matching {
            let delivery = WebhookDelivery::create(
                &self.pool,
                CreateWebhookDelivery {
                    tenant_id: event.tenant_id,
                    webhook_id: subscription.id,
                    event_type: event.event_type.clone(),
                    event_id: event.event_id,
                    payload: event.data.clone(),
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.event_id,
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to create delivery row at fan-out"
                );
                WebhookError::Database(e)
            })?;

            deliveries.push(delivery);
        }

        Ok(deliveries)
    }

    /// Convenience entry point matching the producer-facing contract.
    pub async fn route_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
        event_id: Uuid,
        data: serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>, WebhookError> {
        let event = WebhookEvent {
            event_id,
            event_type: event_type.to_string(),
            tenant_id,
            actor_id: None,
            timestamp: chrono::Utc::now(),
            data,
        };
        self.route(&event).await
    }

    /// Consume events from a broadcast receiver until the channel closes.
    ///
    /// Routing failures are logged and do not stop the loop; a lagged
    /// receiver skips the overwritten events and keeps going.
    pub async fn listen(
        &self,
        mut receiver: tokio::sync::broadcast::Receiver<WebhookEvent>,
    ) {
        use tokio::sync::broadcast::error::RecvError;

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.route(&event).await {
                        tracing::error!(
                            target: "webhook_delivery",
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            error = %e,
                            "Failed to route event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "webhook_delivery",
                        skipped,
                        "Event listener lagged; events were dropped from the channel"
                    );
                }
                Err(RecvError::Closed) => {
                    tracing::info!(
                        target: "webhook_delivery",
                        "Event channel closed; router listener stopping"
                    );
                    break;
                }
            }
        }
    }
}

/// Pure selection step: active subscriptions whose patterns cover the event.
///
/// The caller is expected to pass active rows only (the ledger query already
/// filters), but the active flag is re-checked so the rule holds regardless
/// of the input source.
pub fn select_matching<'a>(
    subscriptions: &'a [WebhookSubscription],
    event_type: &str,
) -> Vec<&'a WebhookSubscription> {
    subscriptions
        .iter()
        .filter(|s| s.is_active && matcher::matches(&s.event_types, event_type))
        .collect()
}
