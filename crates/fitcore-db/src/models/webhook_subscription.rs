//! `WebhookSubscription` model: where and for which events to deliver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A tenant's registration of an external endpoint for event notifications.
///
/// Subscriptions are deactivated rather than deleted once deliveries
/// reference them; the delivery ledger keeps `webhook_id` as a weak
/// reference.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Destination endpoint. HTTPS outside of dev setups.
    pub url: String,
    /// AES-256-GCM-encrypted signing secret, base64(nonce || ciphertext).
    pub secret_encrypted: String,
    /// Subscribed event-type patterns; the literal `"*"` matches everything.
    pub event_types: Vec<String>,
    /// Extra HTTP headers sent with every delivery (JSONB object).
    pub headers: serde_json::Value,
    pub is_active: bool,
    /// Maximum delivery attempts per rolling 60-second window.
    pub rate_limit_per_minute: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a new subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhookSubscription {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub secret_encrypted: String,
    pub event_types: Vec<String>,
    pub headers: serde_json::Value,
    pub rate_limit_per_minute: i32,
    pub created_by: Option<Uuid>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub secret_encrypted: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub headers: Option<serde_json::Value>,
    pub rate_limit_per_minute: Option<i32>,
}

impl WebhookSubscription {
    /// Insert a new subscription.
    pub async fn create(
        pool: &PgPool,
        data: CreateWebhookSubscription,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO webhook_subscriptions
                (tenant_id, name, description, url, secret_encrypted, event_types,
                 headers, rate_limit_per_minute, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.url)
        .bind(&data.secret_encrypted)
        .bind(&data.event_types)
        .bind(&data.headers)
        .bind(data.rate_limit_per_minute)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    /// Find a subscription by id within a tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All active subscriptions for a tenant.
    ///
    /// The event router loads these and applies pattern matching in process;
    /// inactive subscriptions are never considered for fan-out.
    pub async fn find_active_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY created_at ASC
            ",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Paginated listing for a tenant, optionally filtered by active flag.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1
                AND ($4::boolean IS NULL OR is_active = $4)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .bind(is_active)
        .fetch_all(pool)
        .await
    }

    /// Count subscriptions for a tenant, optionally filtered by active flag.
    pub async fn count_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        is_active: Option<bool>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM webhook_subscriptions
            WHERE tenant_id = $1
                AND ($2::boolean IS NULL OR is_active = $2)
            ",
        )
        .bind(tenant_id)
        .bind(is_active)
        .fetch_one(pool)
        .await
    }

    /// Apply a partial update. Returns `None` when the row does not exist.
    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateWebhookSubscription,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_subscriptions
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                url = COALESCE($5, url),
                secret_encrypted = COALESCE($6, secret_encrypted),
                event_types = COALESCE($7, event_types),
                headers = COALESCE($8, headers),
                rate_limit_per_minute = COALESCE($9, rate_limit_per_minute),
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.url)
        .bind(&data.secret_encrypted)
        .bind(&data.event_types)
        .bind(&data.headers)
        .bind(data.rate_limit_per_minute)
        .fetch_optional(pool)
        .await
    }

    /// Activate or deactivate a subscription. Returns `None` when not found.
    pub async fn set_active(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_subscriptions
            SET is_active = $3, updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(is_active)
        .fetch_optional(pool)
        .await
    }

    /// Replace the encrypted signing secret (rotation).
    pub async fn update_secret(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        secret_encrypted: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhook_subscriptions
            SET secret_encrypted = $3, updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(secret_encrypted)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_subscription_input() {
        let data = CreateWebhookSubscription {
            tenant_id: Uuid::new_v4(),
            name: "billing-sync".to_string(),
            description: None,
            url: "https://hooks.example.com/fitcore".to_string(),
            secret_encrypted: "b64ciphertext".to_string(),
            event_types: vec!["invoice.paid".to_string()],
            headers: serde_json::json!({}),
            rate_limit_per_minute: 60,
            created_by: None,
        };

        assert!(!data.url.is_empty());
        assert!(data.rate_limit_per_minute > 0);
    }

    #[test]
    fn test_update_default_is_noop() {
        let data = UpdateWebhookSubscription::default();
        assert!(data.name.is_none());
        assert!(data.url.is_none());
        assert!(data.event_types.is_none());
    }
}
