//! Background dispatcher for the delivery ledger.
//!
//! Polls for due deliveries, claims each with an atomic compare-and-swap,
//! and executes signed HTTP attempts on a bounded task pool. A periodic
//! sweep re-queues deliveries stuck IN_PROGRESS by a crashed worker. Retry
//! scheduling needs no separate process: the working-set query surfaces
//! FAILED rows whose backoff window has elapsed.
//!
//! Multiple workers may run against the same database; the claim query is
//! the only coordination they need.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::time::interval;
use uuid::Uuid;

use crate::rate_limiter::RateLimiterRegistry;
use crate::services::delivery_service::{DeliveryService, HTTP_TIMEOUT_SECS};
use fitcore_db::models::{WebhookDelivery, WebhookSubscription};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent delivery attempts.
    pub concurrency: usize,

    /// How often to poll the ledger for due deliveries (in milliseconds).
    pub poll_interval_ms: u64,

    /// Maximum deliveries considered per poll.
    pub batch_size: i64,

    /// How often to sweep for stuck IN_PROGRESS rows (in seconds).
    pub stuck_sweep_interval_secs: u64,

    /// Age after which an IN_PROGRESS row counts as stuck (in seconds).
    pub stuck_after_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            batch_size: 20,
            stuck_sweep_interval_secs: 30,
            // A live attempt can never outlast its HTTP timeout; double it
            // before declaring the worker dead.
            stuck_after_secs: 2 * HTTP_TIMEOUT_SECS,
        }
    }
}

/// Dispatcher worker that drains the delivery ledger.
pub struct WebhookWorker {
    pool: PgPool,
    delivery_service: Arc<DeliveryService>,
    rate_limiter: Arc<RateLimiterRegistry>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl WebhookWorker {
    /// Create a new worker.
    pub fn new(
        pool: PgPool,
        delivery_service: Arc<DeliveryService>,
        rate_limiter: Arc<RateLimiterRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            pool,
            delivery_service,
            rate_limiter,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the dispatch loop until shutdown is requested.
    pub async fn run(&self) {
        tracing::info!(
            target: "webhook_delivery",
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Starting webhook dispatcher"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut sweep_interval =
            interval(Duration::from_secs(self.config.stuck_sweep_interval_secs));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        tracing::info!(
                            target: "webhook_delivery",
                            "Shutdown requested, stopping dispatch loop"
                        );
                        break;
                    }
                    self.poll_and_dispatch(&semaphore).await;
                }
                _ = sweep_interval.tick() => {
                    self.release_stuck_deliveries().await;
                }
            }
        }

        // Let in-flight attempts finish or hit their HTTP timeout.
        tracing::info!(
            target: "webhook_delivery",
            "Waiting for in-flight deliveries to complete"
        );
        let _ = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await;
        tracing::info!(target: "webhook_delivery", "Webhook dispatcher stopped");
    }

    /// Request graceful shutdown: stop claiming new work, drain in-flight.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// One dispatch cycle over the due working set.
    async fn poll_and_dispatch(&self, semaphore: &Arc<Semaphore>) {
        let max_attempts = self.delivery_service.max_attempts();

        let due = match WebhookDelivery::find_due(&self.pool, self.config.batch_size, max_attempts)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to query due deliveries"
                );
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        tracing::debug!(
            target: "webhook_delivery",
            count = due.len(),
            "Found due deliveries"
        );

        // Subscriptions repeat across a batch; resolve each once per cycle.
        let mut subscriptions: HashMap<Uuid, Option<WebhookSubscription>> = HashMap::new();

        for candidate in due {
            let subscription = match subscriptions.get(&candidate.webhook_id) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = match WebhookSubscription::find_by_id(
                        &self.pool,
                        candidate.tenant_id,
                        candidate.webhook_id,
                    )
                    .await
                    {
                        Ok(sub) => sub,
                        Err(e) => {
                            tracing::error!(
                                target: "webhook_delivery",
                                delivery_id = %candidate.id,
                                error = %e,
                                "Failed to load subscription; skipping delivery this cycle"
                            );
                            continue;
                        }
                    };
                    subscriptions.insert(candidate.webhook_id, loaded.clone());
                    loaded
                }
            };

            // A vanished or deactivated subscription still consumes the
            // delivery through the normal failure path so the row reaches a
            // terminal state instead of lingering PENDING forever.
            let Some(subscription) = subscription.filter(|s| s.is_active) else {
                if let Some(claimed) =
                    self.claim(candidate.id, max_attempts).await
                {
                    self.delivery_service
                        .fail_without_attempt(&claimed, "Subscription is inactive or missing")
                        .await;
                }
                continue;
            };

            // Rate limiting happens before the claim so a deferred attempt
            // leaves the row untouched and does not burn retry budget.
            if !self
                .rate_limiter
                .try_acquire(subscription.id, subscription.rate_limit_per_minute.max(0) as u32)
                .await
            {
                tracing::debug!(
                    target: "webhook_delivery",
                    delivery_id = %candidate.id,
                    subscription_id = %subscription.id,
                    "Rate limited; deferring to a later cycle"
                );
                continue;
            }

            let permit = if let Ok(p) = semaphore.clone().try_acquire_owned() {
                p
            } else {
                tracing::debug!(
                    target: "webhook_delivery",
                    "All delivery slots busy, deferring remaining candidates"
                );
                return;
            };

            let Some(claimed) = self.claim(candidate.id, max_attempts).await else {
                // Another worker got there first.
                continue;
            };

            let delivery_service = self.delivery_service.clone();
            tokio::spawn(async move {
                let _permit = permit;
                delivery_service
                    .execute_delivery(&claimed, &subscription)
                    .await;
            });
        }
    }

    /// Claim one delivery; logs and swallows query errors.
    async fn claim(&self, id: Uuid, max_attempts: i32) -> Option<WebhookDelivery> {
        match WebhookDelivery::claim(&self.pool, id, max_attempts).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %id,
                    error = %e,
                    "Failed to claim delivery"
                );
                None
            }
        }
    }

    /// Re-queue deliveries stuck IN_PROGRESS past the stuck threshold.
    async fn release_stuck_deliveries(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stuck_after_secs as i64);

        match WebhookDelivery::release_stuck(
            &self.pool,
            cutoff,
            self.delivery_service.max_attempts(),
        )
        .await
        {
            Ok(count) if count > 0 => {
                tracing::warn!(
                    target: "webhook_delivery",
                    count,
                    "Released stuck in-progress deliveries"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to release stuck deliveries"
                );
            }
        }
    }
}
