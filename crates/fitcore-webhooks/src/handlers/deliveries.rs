//! Delivery history queries and operator-triggered manual retry.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::str::FromStr;
use uuid::Uuid;

use crate::context::TenantContext;
use crate::error::{ApiResult, WebhookError};
use crate::models::{
    ListDeliveriesQuery, WebhookDeliveryDetailResponse, WebhookDeliveryListResponse,
    WebhookDeliveryResponse,
};
use crate::router::WebhooksState;
use fitcore_db::models::{WebhookDelivery, WebhookDeliveryStatus, WebhookSubscription};

/// Parse an optional status filter from a query string.
fn parse_status_filter(
    status: Option<&str>,
) -> Result<Option<WebhookDeliveryStatus>, WebhookError> {
    status
        .map(|s| {
            WebhookDeliveryStatus::from_str(s).map_err(WebhookError::Validation)
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Delivery history handlers
// ---------------------------------------------------------------------------

/// List delivery attempts for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions/{id}/deliveries",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ListDeliveriesQuery,
    ),
    responses(
        (status = 200, description = "Paginated delivery list", body = WebhookDeliveryListResponse),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_deliveries_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<WebhookDeliveryListResponse>> {
    // Verify subscription exists and belongs to tenant
    WebhookSubscription::find_by_id(state.pool(), ctx.tenant_id, subscription_id)
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)?;

    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let status = parse_status_filter(query.status.as_deref())?;

    let deliveries = WebhookDelivery::list_by_subscription(
        state.pool(),
        ctx.tenant_id,
        subscription_id,
        limit,
        offset,
        status,
    )
    .await?;

    let total = WebhookDelivery::count_by_subscription(
        state.pool(),
        ctx.tenant_id,
        subscription_id,
        status,
    )
    .await?;

    let items = deliveries.into_iter().map(delivery_to_response).collect();

    Ok(Json(WebhookDeliveryListResponse {
        items,
        total,
        limit,
        offset,
    }))
}

/// Get detailed information about a specific delivery attempt.
#[utoipa::path(
    get,
    path = "/webhooks/subscriptions/{id}/deliveries/{delivery_id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery ID"),
    ),
    responses(
        (status = 200, description = "Delivery details", body = WebhookDeliveryDetailResponse),
        (status = 404, description = "Delivery or subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_delivery_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path((subscription_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WebhookDeliveryDetailResponse>> {
    let delivery = WebhookDelivery::find_by_id(state.pool(), ctx.tenant_id, delivery_id)
        .await?
        .filter(|d| d.webhook_id == subscription_id)
        .ok_or(WebhookError::DeliveryNotFound)?;

    Ok(Json(delivery_to_detail_response(delivery)))
}

/// List deliveries across all of the tenant's subscriptions.
#[utoipa::path(
    get,
    path = "/webhooks/deliveries",
    tag = "Webhooks",
    params(ListDeliveriesQuery),
    responses(
        (status = 200, description = "Paginated delivery list", body = WebhookDeliveryListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tenant_deliveries_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<WebhookDeliveryListResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let status = parse_status_filter(query.status.as_deref())?;

    let deliveries =
        WebhookDelivery::list_by_tenant(state.pool(), ctx.tenant_id, limit, offset, status)
            .await?;

    let total = WebhookDelivery::count_by_tenant(state.pool(), ctx.tenant_id, status).await?;

    let items = deliveries.into_iter().map(delivery_to_response).collect();

    Ok(Json(WebhookDeliveryListResponse {
        items,
        total,
        limit,
        offset,
    }))
}

/// Manually retry a failed or exhausted delivery.
///
/// Resets the delivery to PENDING with an immediate retry window. The
/// attempt counter is not reset, so the next failure of an exhausted
/// delivery exhausts it again.
#[utoipa::path(
    post,
    path = "/webhooks/deliveries/{id}/retry",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Delivery ID"),
    ),
    responses(
        (status = 200, description = "Delivery re-queued", body = WebhookDeliveryResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Delivery not found"),
        (status = 409, description = "Delivery is not in a retryable state"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn retry_delivery_handler(
    State(state): State<WebhooksState>,
    Extension(ctx): Extension<TenantContext>,
    Path(delivery_id): Path<Uuid>,
) -> ApiResult<Json<WebhookDeliveryResponse>> {
    if !ctx.is_admin {
        return Err(WebhookError::Forbidden);
    }

    let existing = WebhookDelivery::find_by_id(state.pool(), ctx.tenant_id, delivery_id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    let retried = WebhookDelivery::schedule_manual_retry(state.pool(), ctx.tenant_id, delivery_id)
        .await?
        .ok_or_else(|| {
            WebhookError::DeliveryNotRetryable(format!(
                "delivery is {}, expected failed or exhausted",
                existing.status
            ))
        })?;

    tracing::info!(
        target: "webhook_delivery",
        delivery_id = %delivery_id,
        tenant_id = %ctx.tenant_id,
        actor_id = ?ctx.actor_id,
        attempt_count = retried.attempt_count,
        "Manual retry scheduled"
    );

    Ok(Json(delivery_to_response(retried)))
}

// ---------------------------------------------------------------------------
// Response converters
// ---------------------------------------------------------------------------

/// Convert a DB delivery model to a summary response.
fn delivery_to_response(d: WebhookDelivery) -> WebhookDeliveryResponse {
    WebhookDeliveryResponse {
        id: d.id,
        webhook_id: d.webhook_id,
        event_id: d.event_id,
        event_type: d.event_type,
        status: d.status,
        attempt_count: d.attempt_count,
        next_retry_at: d.next_retry_at,
        last_response_code: d.last_response_code,
        last_error: d.last_error,
        delivered_at: d.delivered_at,
        created_at: d.created_at,
    }
}

/// Convert a DB delivery model to a full detail response.
fn delivery_to_detail_response(d: WebhookDelivery) -> WebhookDeliveryDetailResponse {
    WebhookDeliveryDetailResponse {
        id: d.id,
        webhook_id: d.webhook_id,
        event_id: d.event_id,
        event_type: d.event_type,
        payload: d.payload,
        status: d.status,
        attempt_count: d.attempt_count,
        next_retry_at: d.next_retry_at,
        last_response_code: d.last_response_code,
        last_response_body: d.last_response_body,
        last_error: d.last_error,
        delivered_at: d.delivered_at,
        last_attempt_at: d.last_attempt_at,
        created_at: d.created_at,
        updated_at: d.updated_at,
    }
}
