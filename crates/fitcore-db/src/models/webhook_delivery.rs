//! `WebhookDelivery` model: the delivery ledger.
//!
//! One row per (subscription, event) pair, tracking the full attempt
//! lifecycle. All state transitions are status-guarded UPDATEs so that
//! concurrent dispatcher workers can never double-process a delivery and
//! terminal states stay immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

/// Delivery lifecycle state.
///
/// `Delivered` and `Exhausted` are terminal except for an operator-triggered
/// manual retry, which resets a `Failed` or `Exhausted` row to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebhookDeliveryStatus {
    /// Waiting for a first attempt.
    Pending,
    /// Claimed by a dispatcher worker; an HTTP attempt is running.
    InProgress,
    /// Endpoint acknowledged with a 2xx response.
    Delivered,
    /// Last attempt failed; a retry is scheduled.
    Failed,
    /// Retry budget spent; only a manual retry can revive this row.
    Exhausted,
}

impl fmt::Display for WebhookDeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookDeliveryStatus::Pending => write!(f, "pending"),
            WebhookDeliveryStatus::InProgress => write!(f, "in_progress"),
            WebhookDeliveryStatus::Delivered => write!(f, "delivered"),
            WebhookDeliveryStatus::Failed => write!(f, "failed"),
            WebhookDeliveryStatus::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl std::str::FromStr for WebhookDeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(WebhookDeliveryStatus::Pending),
            "in_progress" => Ok(WebhookDeliveryStatus::InProgress),
            "delivered" => Ok(WebhookDeliveryStatus::Delivered),
            "failed" => Ok(WebhookDeliveryStatus::Failed),
            "exhausted" => Ok(WebhookDeliveryStatus::Exhausted),
            _ => Err(format!("Unknown delivery status: {s}")),
        }
    }
}

/// One delivery attempt history for a (subscription, event) pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Owning subscription (weak reference; the subscription may have been
    /// deactivated since fan-out).
    pub webhook_id: Uuid,
    pub event_type: String,
    /// Originating domain event; receivers use this for deduplication.
    pub event_id: Uuid,
    pub payload: serde_json::Value,
    pub status: WebhookDeliveryStatus,
    /// Send attempts made so far; incremented by the claim, never reset.
    pub attempt_count: i32,
    /// Earliest time a further attempt may run; NULL when none is scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_response_body: Option<String>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set by the claim; drives the stuck-delivery sweep.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a new pending delivery at fan-out time.
#[derive(Debug, Clone)]
pub struct CreateWebhookDelivery {
    pub tenant_id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub event_id: Uuid,
    pub payload: serde_json::Value,
}

impl WebhookDelivery {
    /// Insert a new PENDING row with no attempts and no retry schedule.
    pub async fn create(
        pool: &PgPool,
        data: CreateWebhookDelivery,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO webhook_deliveries
                (tenant_id, webhook_id, event_type, event_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(data.tenant_id)
        .bind(data.webhook_id)
        .bind(&data.event_type)
        .bind(data.event_id)
        .bind(&data.payload)
        .fetch_one(pool)
        .await
    }

    /// The dispatcher's working-set query: deliveries due for an attempt.
    ///
    /// Returns PENDING rows (fresh, or reset by a manual retry) and FAILED
    /// rows whose backoff window has elapsed and whose retry budget remains,
    /// ordered by `next_retry_at` with fresh PENDING rows (NULL) first.
    ///
    /// Read-only; claiming is a separate compare-and-swap so a candidate
    /// skipped for rate limiting keeps its state untouched.
    pub async fn find_due(
        pool: &PgPool,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE (status = 'pending'
                       AND (next_retry_at IS NULL OR next_retry_at <= now()))
               OR (status = 'failed'
                       AND attempt_count < $2
                       AND next_retry_at IS NOT NULL
                       AND next_retry_at <= now())
            ORDER BY next_retry_at ASC NULLS FIRST
            LIMIT $1
            ",
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(pool)
        .await
    }

    /// Atomically claim a due delivery for one attempt.
    ///
    /// Transitions PENDING or retry-eligible FAILED to IN_PROGRESS and
    /// increments `attempt_count` in a single guarded UPDATE. Returns `None`
    /// when the row is no longer claimable — another worker won the race, a
    /// prior attempt already resolved it, or it is not yet due. This is the
    /// at-most-once-in-flight guarantee for concurrent workers.
    pub async fn claim(
        pool: &PgPool,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_deliveries
            SET status = 'in_progress',
                attempt_count = attempt_count + 1,
                last_attempt_at = now(),
                updated_at = now()
            WHERE id = $1
                AND ((status = 'pending'
                          AND (next_retry_at IS NULL OR next_retry_at <= now()))
                  OR (status = 'failed'
                          AND attempt_count < $2
                          AND next_retry_at IS NOT NULL
                          AND next_retry_at <= now()))
            RETURNING *
            ",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(pool)
        .await
    }

    /// Record a successful attempt. Only valid from IN_PROGRESS; calling it
    /// on an already-resolved row is a no-op returning `None`.
    pub async fn mark_delivered(
        pool: &PgPool,
        id: Uuid,
        response_code: i32,
        response_body: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_deliveries
            SET status = 'delivered',
                last_response_code = $2,
                last_response_body = $3,
                last_error = NULL,
                delivered_at = now(),
                next_retry_at = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(response_body)
        .fetch_optional(pool)
        .await
    }

    /// Record a failed attempt. Only valid from IN_PROGRESS.
    ///
    /// A `Some` `next_retry_at` schedules a retry (status FAILED); `None`
    /// means the retry budget is spent (status EXHAUSTED, no automatic
    /// retry ever again).
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        response_code: Option<i32>,
        response_body: Option<&str>,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_deliveries
            SET status = CASE WHEN $5::timestamptz IS NULL
                              THEN 'exhausted' ELSE 'failed' END,
                last_response_code = $2,
                last_response_body = $3,
                last_error = $4,
                next_retry_at = $5,
                updated_at = now()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(response_code)
        .bind(response_body)
        .bind(error)
        .bind(next_retry_at)
        .fetch_optional(pool)
        .await
    }

    /// Operator-triggered retry of a FAILED or EXHAUSTED delivery.
    ///
    /// Resets the row to PENDING with `next_retry_at = now()`. The attempt
    /// counter is deliberately not reset: a manual retry is a last-chance
    /// attempt, and the next failure re-exhausts the row immediately.
    /// Returns `None` when the row is missing or not in a retryable state.
    pub async fn schedule_manual_retry(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_deliveries
            SET status = 'pending',
                next_retry_at = now(),
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
                AND status IN ('failed', 'exhausted')
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Crash-recovery sweep: re-queue deliveries stuck IN_PROGRESS.
    ///
    /// A worker that dies between the claim and the outcome update leaves
    /// its row IN_PROGRESS. Rows whose attempt started before `cutoff`
    /// become FAILED and immediately due again, or EXHAUSTED when the
    /// attempt budget is already spent. Returns the number of rows swept.
    pub async fn release_stuck(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhook_deliveries
            SET status = CASE WHEN attempt_count >= $2
                              THEN 'exhausted' ELSE 'failed' END,
                next_retry_at = CASE WHEN attempt_count >= $2
                                     THEN NULL ELSE now() END,
                last_error = 'attempt abandoned: worker timed out or crashed mid-delivery',
                updated_at = now()
            WHERE status = 'in_progress' AND last_attempt_at < $1
            ",
        )
        .bind(cutoff)
        .bind(max_attempts)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Find a delivery by id within a tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Delivery history for one subscription, newest first.
    pub async fn list_by_subscription(
        pool: &PgPool,
        tenant_id: Uuid,
        webhook_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<WebhookDeliveryStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE tenant_id = $1 AND webhook_id = $2
                AND ($5::varchar IS NULL OR status = $5)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(webhook_id)
        .bind(limit)
        .bind(offset)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Count delivery history for one subscription.
    pub async fn count_by_subscription(
        pool: &PgPool,
        tenant_id: Uuid,
        webhook_id: Uuid,
        status: Option<WebhookDeliveryStatus>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE tenant_id = $1 AND webhook_id = $2
                AND ($3::varchar IS NULL OR status = $3)
            ",
        )
        .bind(tenant_id)
        .bind(webhook_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }

    /// Tenant-wide delivery listing, newest first.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        status: Option<WebhookDeliveryStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_deliveries
            WHERE tenant_id = $1
                AND ($4::varchar IS NULL OR status = $4)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Count tenant-wide deliveries.
    pub async fn count_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        status: Option<WebhookDeliveryStatus>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM webhook_deliveries
            WHERE tenant_id = $1
                AND ($2::varchar IS NULL OR status = $2)
            ",
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }
}
