//! CRUD handlers for webhook subscriptions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::context::TenantContext;
use crate::error::{ApiResult, WebhookError};
use crate::models::{
    CreateSubscriptionResponse, CreateWebhookSubscriptionRequest, EventTypeInfo,
    EventTypeListResponse, ListSubscriptionsQuery, RegenerateSecretResponse,
    UpdateWebhookSubscriptionRequest, WebhookEventType, WebhookSubscriptionListResponse,
    WebhookSubscriptionResponse,
};
use crate::router::WebhooksState;

/// Require mutation rights on the calling context.
fn require_admin(ctx: &TenantContext) -> Result<(), WebhookError> {
    if ctx.is_admin {
        Ok(())
    } else {
        Err(WebhookError::Forbidden)
    }
}

// ---------------------------------------------------------------------------
// Subscription CRUD handlers
// ---------------------------------------------------------------------------

/// Create a new webhook subscription.
#[utoipa::path(
    post,
    path = "/webhooks/subscriptions",
    tag = "Webhooks",
    request_body = CreateWebhookSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created; secret shown once", body = CreateSubscriptionResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Subscription limit exceeded"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_subscription_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Json(request): Json<CreateWebhookSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSubscriptionResponse>)> {
    require_admin(&ctx)?;

    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state
        .subscription_service
        .create_subscription(ctx.tenant_id, ctx.actor_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// List webhook subscriptions.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions",
    tag = "Webhooks",
    params(ListSubscriptionsQuery),
    responses(
        (status = 200, description = "Paginated subscription list", body = WebhookSubscriptionListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_subscriptions_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> ApiResult<Json<WebhookSubscriptionListResponse>> {
    let response = state
        .subscription_service
        .list_subscriptions(ctx.tenant_id, query)
        .await?;

    Ok(Json(response))
}

/// Get a single webhook subscription.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions/{id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription details", body = WebhookSubscriptionResponse),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_subscription_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookSubscriptionResponse>> {
    let response = state
        .subscription_service
        .get_subscription(ctx.tenant_id, id)
        .await?;

    Ok(Json(response))
}

/// Update a webhook subscription.
#[utoipa::path(
    patch,
    path = "/webhooks/subscriptions/{id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    request_body = UpdateWebhookSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated", body = WebhookSubscriptionResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_subscription_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookSubscriptionRequest>,
) -> ApiResult<Json<WebhookSubscriptionResponse>> {
    require_admin(&ctx)?;

    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let response = state
        .subscription_service
        .update_subscription(ctx.tenant_id, id, request)
        .await?;

    Ok(Json(response))
}

/// Activate a subscription.
#[utoipa::path(
    post,
    path = "/webhooks/subscriptions/{id}/activate",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription activated", body = WebhookSubscriptionResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn activate_subscription_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookSubscriptionResponse>> {
    require_admin(&ctx)?;

    let response = state
        .subscription_service
        .activate_subscription(ctx.tenant_id, id)
        .await?;

    Ok(Json(response))
}

/// Deactivate a subscription (the removal path; no hard delete exists).
#[utoipa::path(
    post,
    path = "/webhooks/subscriptions/{id}/deactivate",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription deactivated", body = WebhookSubscriptionResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_subscription_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookSubscriptionResponse>> {
    require_admin(&ctx)?;

    let response = state
        .subscription_service
        .deactivate_subscription(ctx.tenant_id, id)
        .await?;

    Ok(Json(response))
}

/// Rotate a subscription's signing secret.
#[utoipa::path(
    post,
    path = "/webhooks/subscriptions/{id}/secret",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "New secret, shown once", body = RegenerateSecretResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn regenerate_secret_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RegenerateSecretResponse>> {
    require_admin(&ctx)?;

    let response = state
        .subscription_service
        .regenerate_secret(ctx.tenant_id, id)
        .await?;

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Event types handler
// ---------------------------------------------------------------------------

/// List all supported webhook event types.
#[utoipa::path(
    get,
    path = "/webhooks/event-types",
    tag = "Webhooks",
    responses(
        (status = 200, description = "List of event types", body = EventTypeListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_event_types_handler() -> Json<EventTypeListResponse> {
    let event_types = WebhookEventType::all()
        .into_iter()
        .map(|et| EventTypeInfo {
            event_type: et.as_str().to_string(),
            category: et.category().to_string(),
            description: et.description().to_string(),
        })
        .collect();

    Json(EventTypeListResponse { event_types })
}
