//! Webhook subscription administration.
//!
//! Business logic for creating, listing, updating, activating, deactivating,
//! and rotating the secret of webhook subscriptions, with URL validation,
//! SSRF protection, secret encryption, and per-tenant subscription limits.

use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{
    CreateSubscriptionResponse, CreateWebhookSubscriptionRequest, ListSubscriptionsQuery,
    RegenerateSecretResponse, UpdateWebhookSubscriptionRequest, WebhookSubscriptionListResponse,
    WebhookSubscriptionResponse,
};
use crate::validation;
use fitcore_db::models::{
    CreateWebhookSubscription, UpdateWebhookSubscription, WebhookSubscription,
};

/// Default maximum subscriptions per tenant.
pub const DEFAULT_MAX_SUBSCRIPTIONS: i64 = 25;

/// Default per-minute delivery rate limit for new subscriptions.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: i32 = 60;

/// Service for webhook subscription operations.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    encryption_key: Vec<u8>,
    max_subscriptions: i64,
    allow_http: bool,
}

impl SubscriptionService {
    /// Create a new subscription service.
    #[must_use]
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Self {
        Self {
            pool,
            encryption_key,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            allow_http: false,
        }
    }

    /// Set the maximum subscriptions per tenant.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: i64) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Allow HTTP URLs (for development/testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Create a new webhook subscription.
    ///
    /// When the caller supplies no secret, one is generated. The plaintext
    /// secret is returned exactly once in the response; only the encrypted
    /// form is stored.
    pub async fn create_subscription(
        &self,
        tenant_id: Uuid,
        created_by: Option<Uuid>,
        request: CreateWebhookSubscriptionRequest,
    ) -> Result<CreateSubscriptionResponse, WebhookError> {
        validation::validate_webhook_url(&request.url, self.allow_http)?;
        validation::validate_event_patterns(&request.event_types)?;

        let headers = request.headers.unwrap_or_else(|| serde_json::json!({}));
        validation::validate_headers(&headers)?;

        let rate_limit = request
            .rate_limit_per_minute
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);
        validation::validate_rate_limit(rate_limit)?;

        let count = WebhookSubscription::count_by_tenant(&self.pool, tenant_id, None).await?;
        if count >= self.max_subscriptions {
            return Err(WebhookError::SubscriptionLimitExceeded {
                limit: self.max_subscriptions,
            });
        }

        let secret = match request.secret {
            Some(s) if !s.is_empty() => s,
            _ => crypto::generate_secret(),
        };
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        let input = CreateWebhookSubscription {
            tenant_id,
            name: request.name,
            description: request.description,
            url: request.url,
            secret_encrypted,
            event_types: request.event_types,
            headers,
            rate_limit_per_minute: rate_limit,
            created_by,
        };

        let sub = WebhookSubscription::create(&self.pool, input).await?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %sub.id,
            tenant_id = %tenant_id,
            "Webhook subscription created"
        );

        Ok(CreateSubscriptionResponse {
            subscription: subscription_to_response(sub),
            secret,
        })
    }

    /// List webhook subscriptions for a tenant with pagination.
    pub async fn list_subscriptions(
        &self,
        tenant_id: Uuid,
        query: ListSubscriptionsQuery,
    ) -> Result<WebhookSubscriptionListResponse, WebhookError> {
        let limit = query.limit.clamp(1, 100);
        let offset = query.offset.max(0);

        let subs = WebhookSubscription::list_by_tenant(
            &self.pool,
            tenant_id,
            limit,
            offset,
            query.is_active,
        )
        .await?;

        let total =
            WebhookSubscription::count_by_tenant(&self.pool, tenant_id, query.is_active).await?;

        Ok(WebhookSubscriptionListResponse {
            items: subs.into_iter().map(subscription_to_response).collect(),
            total,
            limit,
            offset,
        })
    }

    /// Get a single webhook subscription.
    pub async fn get_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscriptionResponse, WebhookError> {
        let sub = WebhookSubscription::find_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        Ok(subscription_to_response(sub))
    }

    /// Update a webhook subscription.
    pub async fn update_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: UpdateWebhookSubscriptionRequest,
    ) -> Result<WebhookSubscriptionResponse, WebhookError> {
        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.allow_http)?;
        }
        if let Some(ref event_types) = request.event_types {
            validation::validate_event_patterns(event_types)?;
        }
        if let Some(ref headers) = request.headers {
            validation::validate_headers(headers)?;
        }
        if let Some(rate_limit) = request.rate_limit_per_minute {
            validation::validate_rate_limit(rate_limit)?;
        }

        let secret_encrypted = match &request.secret {
            Some(secret) if !secret.is_empty() => {
                Some(crypto::encrypt_secret(secret, &self.encryption_key)?)
            }
            _ => None,
        };

        let input = UpdateWebhookSubscription {
            name: request.name,
            description: request.description,
            url: request.url,
            secret_encrypted,
            event_types: request.event_types,
            headers: request.headers,
            rate_limit_per_minute: request.rate_limit_per_minute,
        };

        let sub = WebhookSubscription::update(&self.pool, tenant_id, id, input)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        Ok(subscription_to_response(sub))
    }

    /// Activate a subscription so it matches events again.
    pub async fn activate_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscriptionResponse, WebhookError> {
        self.set_active(tenant_id, id, true).await
    }

    /// Deactivate a subscription.
    ///
    /// This is the removal path: subscriptions referenced by deliveries are
    /// never hard-deleted, and the admin API exposes no DELETE.
    pub async fn deactivate_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscriptionResponse, WebhookError> {
        self.set_active(tenant_id, id, false).await
    }

    async fn set_active(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        is_active: bool,
    ) -> Result<WebhookSubscriptionResponse, WebhookError> {
        let sub = WebhookSubscription::set_active(&self.pool, tenant_id, id, is_active)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            tenant_id = %tenant_id,
            is_active,
            "Webhook subscription active flag changed"
        );

        Ok(subscription_to_response(sub))
    }

    /// Rotate a subscription's signing secret.
    ///
    /// Generates a new secret, stores the encrypted form, and returns the
    /// plaintext exactly once. Deliveries attempted after this call are
    /// signed with the new secret.
    pub async fn regenerate_secret(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<RegenerateSecretResponse, WebhookError> {
        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        WebhookSubscription::update_secret(&self.pool, tenant_id, id, &secret_encrypted)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            tenant_id = %tenant_id,
            "Webhook signing secret rotated"
        );

        Ok(RegenerateSecretResponse { id, secret })
    }
}

/// Convert a DB model to an API response.
fn subscription_to_response(sub: WebhookSubscription) -> WebhookSubscriptionResponse {
    WebhookSubscriptionResponse {
        id: sub.id,
        tenant_id: sub.tenant_id,
        name: sub.name,
        description: sub.description,
        url: sub.url,
        event_types: sub.event_types,
        headers: sub.headers,
        is_active: sub.is_active,
        rate_limit_per_minute: sub.rate_limit_per_minute,
        created_at: sub.created_at,
        updated_at: sub.updated_at,
    }
}
