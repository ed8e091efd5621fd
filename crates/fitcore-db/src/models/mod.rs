//! Database entity models for the webhook subsystem.
//!
//! These models represent the database tables and provide type-safe
//! interactions with PostgreSQL.

pub mod webhook_delivery;
pub mod webhook_subscription;

pub use webhook_delivery::{
    CreateWebhookDelivery, WebhookDelivery, WebhookDeliveryStatus,
};
pub use webhook_subscription::{
    CreateWebhookSubscription, UpdateWebhookSubscription, WebhookSubscription,
};
