//! API models for the webhook subsystem: event types, request/response DTOs,
//! and the outbound payload envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use fitcore_db::models::WebhookDeliveryStatus;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Domain events a subscription can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    MemberCreated,
    MemberUpdated,
    MemberDeleted,
    MembershipStarted,
    MembershipRenewed,
    MembershipCancelled,
    InvoiceCreated,
    InvoicePaid,
    InvoicePaymentFailed,
    TicketOpened,
    TicketClosed,
    AnnouncementPublished,
    ClassBooked,
    ClassCancelled,
}

impl WebhookEventType {
    /// Wire name, e.g. `invoice.paid`.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::MemberCreated => "member.created",
            WebhookEventType::MemberUpdated => "member.updated",
            WebhookEventType::MemberDeleted => "member.deleted",
            WebhookEventType::MembershipStarted => "membership.started",
            WebhookEventType::MembershipRenewed => "membership.renewed",
            WebhookEventType::MembershipCancelled => "membership.cancelled",
            WebhookEventType::InvoiceCreated => "invoice.created",
            WebhookEventType::InvoicePaid => "invoice.paid",
            WebhookEventType::InvoicePaymentFailed => "invoice.payment_failed",
            WebhookEventType::TicketOpened => "ticket.opened",
            WebhookEventType::TicketClosed => "ticket.closed",
            WebhookEventType::AnnouncementPublished => "announcement.published",
            WebhookEventType::ClassBooked => "class.booked",
            WebhookEventType::ClassCancelled => "class.cancelled",
        }
    }

    /// Parse a wire name; `None` for unknown types.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|et| et.as_str() == s)
    }

    /// Every supported event type.
    pub fn all() -> Vec<Self> {
        vec![
            WebhookEventType::MemberCreated,
            WebhookEventType::MemberUpdated,
            WebhookEventType::MemberDeleted,
            WebhookEventType::MembershipStarted,
            WebhookEventType::MembershipRenewed,
            WebhookEventType::MembershipCancelled,
            WebhookEventType::InvoiceCreated,
            WebhookEventType::InvoicePaid,
            WebhookEventType::InvoicePaymentFailed,
            WebhookEventType::TicketOpened,
            WebhookEventType::TicketClosed,
            WebhookEventType::AnnouncementPublished,
            WebhookEventType::ClassBooked,
            WebhookEventType::ClassCancelled,
        ]
    }

    /// Event grouping shown in the admin UI.
    pub fn category(&self) -> &'static str {
        match self {
            WebhookEventType::MemberCreated
            | WebhookEventType::MemberUpdated
            | WebhookEventType::MemberDeleted => "member",
            WebhookEventType::MembershipStarted
            | WebhookEventType::MembershipRenewed
            | WebhookEventType::MembershipCancelled => "membership",
            WebhookEventType::InvoiceCreated
            | WebhookEventType::InvoicePaid
            | WebhookEventType::InvoicePaymentFailed => "billing",
            WebhookEventType::TicketOpened | WebhookEventType::TicketClosed => "support",
            WebhookEventType::AnnouncementPublished => "marketing",
            WebhookEventType::ClassBooked | WebhookEventType::ClassCancelled => "scheduling",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WebhookEventType::MemberCreated => "A member profile was created",
            WebhookEventType::MemberUpdated => "A member profile was updated",
            WebhookEventType::MemberDeleted => "A member profile was removed",
            WebhookEventType::MembershipStarted => "A membership plan became active",
            WebhookEventType::MembershipRenewed => "A membership plan was renewed",
            WebhookEventType::MembershipCancelled => "A membership plan was cancelled",
            WebhookEventType::InvoiceCreated => "An invoice was issued",
            WebhookEventType::InvoicePaid => "An invoice was paid in full",
            WebhookEventType::InvoicePaymentFailed => "An invoice payment attempt failed",
            WebhookEventType::TicketOpened => "A support ticket was opened",
            WebhookEventType::TicketClosed => "A support ticket was closed",
            WebhookEventType::AnnouncementPublished => "A club announcement went live",
            WebhookEventType::ClassBooked => "A member booked a class slot",
            WebhookEventType::ClassCancelled => "A class booking was cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound payload envelope
// ---------------------------------------------------------------------------

/// JSON body POSTed to subscription endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookPayload {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Subscription DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookSubscriptionRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub url: String,
    /// Signing secret; generated server-side when omitted.
    pub secret: Option<String>,
    pub event_types: Vec<String>,
    /// Extra headers to send with every delivery.
    pub headers: Option<serde_json::Value>,
    /// Maximum delivery attempts per rolling minute (default 60).
    pub rate_limit_per_minute: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateWebhookSubscriptionRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub headers: Option<serde_json::Value>,
    pub rate_limit_per_minute: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookSubscriptionResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub event_types: Vec<String>,
    pub headers: serde_json::Value,
    pub is_active: bool,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned on create: the plaintext secret is shown exactly once.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateSubscriptionResponse {
    #[serde(flatten)]
    pub subscription: WebhookSubscriptionResponse,
    pub secret: String,
}

/// Returned on secret rotation: the new plaintext secret, shown once.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegenerateSecretResponse {
    pub id: Uuid,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListSubscriptionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Filter by active flag when present.
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookSubscriptionListResponse {
    pub items: Vec<WebhookSubscriptionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Delivery DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListDeliveriesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Filter by delivery status when present.
    pub status: Option<String>,
}

/// Summary row for delivery listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookDeliveryResponse {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    #[schema(value_type = String, example = "delivered")]
    pub status: WebhookDeliveryStatus,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Full diagnostics for a single delivery.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookDeliveryDetailResponse {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[schema(value_type = String, example = "failed")]
    pub status: WebhookDeliveryStatus,
    pub attempt_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_response_body: Option<String>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookDeliveryListResponse {
    pub items: Vec<WebhookDeliveryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Event type listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventTypeInfo {
    pub event_type: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventTypeListResponse {
    pub event_types: Vec<EventTypeInfo>,
}

fn default_limit() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parse_roundtrip() {
        for et in WebhookEventType::all() {
            assert_eq!(WebhookEventType::parse(et.as_str()), Some(et));
        }
    }

    #[test]
    fn test_event_type_parse_unknown() {
        assert_eq!(WebhookEventType::parse("forecast.generated"), None);
        assert_eq!(WebhookEventType::parse(""), None);
    }

    #[test]
    fn test_wildcard_is_not_an_event_type() {
        // "*" is a subscription pattern, not an event that can fire.
        assert_eq!(WebhookEventType::parse("*"), None);
    }

    #[test]
    fn test_every_event_type_has_category() {
        for et in WebhookEventType::all() {
            assert!(!et.category().is_empty());
            assert!(!et.description().is_empty());
        }
    }

    #[test]
    fn test_payload_envelope_shape() {
        let payload = WebhookPayload {
            event_id: Uuid::new_v4(),
            event_type: "invoice.paid".to_string(),
            timestamp: Utc::now(),
            tenant_id: Uuid::new_v4(),
            data: serde_json::json!({"invoice_id": "inv_1"}),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("event_id").is_some());
        assert!(json.get("event_type").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("data").is_some());
    }
}
