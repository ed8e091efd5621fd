//! Outbound webhook delivery for FitCore domain events.
//!
//! Provides tenant-scoped subscription management, durable at-least-once
//! delivery with HMAC-SHA256 signing, fixed-schedule backoff retries,
//! per-subscription rate limiting, and crash recovery for stuck attempts.

pub mod context;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod matcher;
pub mod models;
pub mod rate_limiter;
pub mod retry;
pub mod router;
pub mod services;
pub mod validation;
pub mod worker;

pub use context::TenantContext;
pub use error::WebhookError;
pub use models::WebhookEventType;
pub use rate_limiter::{RateLimiter, RateLimiterRegistry};
pub use router::{webhooks_router, WebhooksState};
pub use services::event_publisher::{EventPublisher, WebhookEvent};
pub use services::event_router::EventRouter;
pub use worker::{WebhookWorker, WorkerConfig};
