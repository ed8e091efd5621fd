//! Delivery execution: the signed HTTP POST and outcome recording.
//!
//! Operates on deliveries already claimed IN_PROGRESS by the worker; every
//! attempt ends in exactly one of `mark_delivered` or `mark_failed`.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::WebhookPayload;
use crate::retry;
use fitcore_db::models::{WebhookDelivery, WebhookSubscription};

/// Bound on every outbound HTTP call.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Stored response bodies are truncated to this many characters.
pub const MAX_RESPONSE_BODY_CHARS: usize = 10_000;

/// Stored error messages are truncated to this many characters.
pub const MAX_ERROR_CHARS: usize = 2_000;

/// Classification of one HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx: done.
    Success,
    /// Worth retrying after backoff (5xx, timeouts, transport errors, 429).
    Transient,
    /// The endpoint will never accept this payload; skip the remaining
    /// retry budget.
    Permanent,
}

/// Classify an HTTP status code.
///
/// 429 (rate limited) and 408 (request timeout) are always transient. Other
/// 4xx responses are transient by default so a misconfigured endpoint gets
/// the full retry budget; with `fail_fast_on_client_error` they exhaust the
/// delivery immediately.
pub fn classify_status(status: u16, fail_fast_on_client_error: bool) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Success,
        408 | 429 => DeliveryOutcome::Transient,
        400..=499 if fail_fast_on_client_error => DeliveryOutcome::Permanent,
        _ => DeliveryOutcome::Transient,
    }
}

/// Truncate to a character budget (diagnostics columns are bounded).
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Service executing individual delivery attempts.
#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    http_client: Client,
    encryption_key: Vec<u8>,
    max_attempts: i32,
    fail_fast_on_client_error: bool,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("fitcore-webhooks/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http_client,
            encryption_key,
            max_attempts: retry::MAX_RETRY_ATTEMPTS,
            fail_fast_on_client_error: false,
        })
    }

    /// Set the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Exhaust deliveries immediately on non-retryable 4xx responses
    /// instead of consuming the full retry budget.
    #[must_use]
    pub fn with_fail_fast_on_client_error(mut self, fail_fast: bool) -> Self {
        self.fail_fast_on_client_error = fail_fast;
        self
    }

    /// Maximum delivery attempts currently configured.
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Get a reference to the connection pool (for the worker).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute one attempt for a delivery already claimed IN_PROGRESS.
    pub async fn execute_delivery(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
    ) {
        let envelope = WebhookPayload {
            event_id: delivery.event_id,
            event_type: delivery.event_type.clone(),
            timestamp: Utc::now(),
            tenant_id: delivery.tenant_id,
            data: delivery.payload.clone(),
        };

        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                self.record_failure(
                    delivery,
                    &format!("Failed to serialize payload: {e}"),
                    None,
                    None,
                    DeliveryOutcome::Transient,
                )
                .await;
                return;
            }
        };

        let timestamp = envelope.timestamp.timestamp().to_string();
        let headers = match self.build_headers(delivery, subscription, &timestamp, &body) {
            Ok(h) => h,
            Err(e) => {
                self.record_failure(
                    delivery,
                    &format!("Failed to prepare request: {e}"),
                    None,
                    None,
                    DeliveryOutcome::Transient,
                )
                .await;
                return;
            }
        };

        let result = self
            .http_client
            .post(&subscription.url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_RESPONSE_BODY_CHARS)
                    .collect::<String>();

                match classify_status(status, self.fail_fast_on_client_error) {
                    DeliveryOutcome::Success => {
                        self.record_success(delivery, subscription, i32::from(status), &body)
                            .await;
                    }
                    outcome => {
                        self.record_failure(
                            delivery,
                            &format!("HTTP {status}"),
                            Some(i32::from(status)),
                            Some(&body),
                            outcome,
                        )
                        .await;
                    }
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    format!("Request timeout ({HTTP_TIMEOUT_SECS}s)")
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };

                self.record_failure(delivery, &error_msg, None, None, DeliveryOutcome::Transient)
                    .await;
            }
        }
    }

    /// Assemble the outgoing header set: envelope headers, the
    /// subscription's custom headers, and the payload signature.
    fn build_headers(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        timestamp: &str,
        body: &[u8],
    ) -> Result<reqwest::header::HeaderMap, WebhookError> {
        use reqwest::header::{HeaderName, HeaderValue};

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "X-Webhook-Timestamp",
            timestamp
                .parse()
                .map_err(|_| WebhookError::Internal("invalid timestamp header".to_string()))?,
        );
        headers.insert(
            "X-Event-ID",
            delivery
                .event_id
                .to_string()
                .parse()
                .map_err(|_| WebhookError::Internal("invalid event id header".to_string()))?,
        );

        // Custom headers were validated at subscription time; entries that
        // no longer parse are skipped rather than failing the attempt.
        if let Some(custom) = subscription.headers.as_object() {
            for (name, value) in custom {
                let (Ok(name), Some(value)) = (name.parse::<HeaderName>(), value.as_str()) else {
                    continue;
                };
                if let Ok(value) = value.parse::<HeaderValue>() {
                    headers.insert(name, value);
                }
            }
        }

        // The signature authenticates the sender; without it anyone knowing
        // the URL could forge deliveries.
        let secret = crypto::decrypt_secret(&subscription.secret_encrypted, &self.encryption_key)?;
        let signature = crypto::sign_payload(&secret, timestamp, body);
        headers.insert(
            "X-Webhook-Signature",
            format!("sha256={signature}")
                .parse()
                .map_err(|_| WebhookError::Internal("invalid signature header".to_string()))?,
        );

        Ok(headers)
    }

    async fn record_success(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        response_code: i32,
        response_body: &str,
    ) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            tenant_id = %delivery.tenant_id,
            event_id = %delivery.event_id,
            event_type = %delivery.event_type,
            response_code,
            attempt_count = delivery.attempt_count,
            "Webhook delivery succeeded"
        );

        if let Err(e) = WebhookDelivery::mark_delivered(
            &self.pool,
            delivery.id,
            response_code,
            Some(response_body),
        )
        .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery success"
            );
        }
    }

    async fn record_failure(
        &self,
        delivery: &WebhookDelivery,
        error_message: &str,
        response_code: Option<i32>,
        response_body: Option<&str>,
        outcome: DeliveryOutcome,
    ) {
        // `attempt_count` was already incremented by the claim.
        let next_retry_at = match outcome {
            DeliveryOutcome::Permanent => None,
            _ => retry::next_retry_at(delivery.attempt_count, self.max_attempts),
        };
        let exhausted = next_retry_at.is_none();

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %delivery.webhook_id,
            tenant_id = %delivery.tenant_id,
            event_id = %delivery.event_id,
            event_type = %delivery.event_type,
            error = %error_message,
            attempt_count = delivery.attempt_count,
            exhausted,
            "Webhook delivery failed"
        );

        let error_message = truncate_chars(error_message, MAX_ERROR_CHARS);
        let response_body = response_body.map(|b| truncate_chars(b, MAX_RESPONSE_BODY_CHARS));

        if let Err(e) = WebhookDelivery::mark_failed(
            &self.pool,
            delivery.id,
            response_code,
            response_body.as_deref(),
            &error_message,
            next_retry_at,
        )
        .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record delivery failure"
            );
        }
    }

    /// Fail a claimed delivery without an HTTP attempt (e.g. the owning
    /// subscription vanished or was deactivated between fan-out and
    /// dispatch). Normal backoff applies so the row still terminates in
    /// DELIVERED or EXHAUSTED and nothing is silently dropped.
    pub async fn fail_without_attempt(&self, delivery: &WebhookDelivery, reason: &str) {
        self.record_failure(delivery, reason, None, None, DeliveryOutcome::Transient)
            .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_codes() {
        assert_eq!(classify_status(200, false), DeliveryOutcome::Success);
        assert_eq!(classify_status(201, false), DeliveryOutcome::Success);
        assert_eq!(classify_status(204, false), DeliveryOutcome::Success);
    }

    #[test]
    fn test_classify_server_errors_transient() {
        assert_eq!(classify_status(500, false), DeliveryOutcome::Transient);
        assert_eq!(classify_status(503, false), DeliveryOutcome::Transient);
        assert_eq!(classify_status(500, true), DeliveryOutcome::Transient);
    }

    #[test]
    fn test_classify_client_errors_default_transient() {
        assert_eq!(classify_status(400, false), DeliveryOutcome::Transient);
        assert_eq!(classify_status(404, false), DeliveryOutcome::Transient);
    }

    #[test]
    fn test_classify_client_errors_fail_fast() {
        assert_eq!(classify_status(400, true), DeliveryOutcome::Permanent);
        assert_eq!(classify_status(404, true), DeliveryOutcome::Permanent);
        assert_eq!(classify_status(410, true), DeliveryOutcome::Permanent);
    }

    #[test]
    fn test_classify_rate_limit_always_transient() {
        assert_eq!(classify_status(429, false), DeliveryOutcome::Transient);
        assert_eq!(classify_status(429, true), DeliveryOutcome::Transient);
        assert_eq!(classify_status(408, true), DeliveryOutcome::Transient);
    }

    #[test]
    fn test_classify_redirects_transient() {
        // Redirect policy is none, so a 3xx surfaces as a failed attempt.
        assert_eq!(classify_status(301, false), DeliveryOutcome::Transient);
        assert_eq!(classify_status(301, true), DeliveryOutcome::Transient);
    }

    #[test]
    fn test_truncate_chars_bounds() {
        let long = "x".repeat(MAX_RESPONSE_BODY_CHARS + 500);
        assert_eq!(
            truncate_chars(&long, MAX_RESPONSE_BODY_CHARS).chars().count(),
            MAX_RESPONSE_BODY_CHARS
        );

        let short = "short";
        assert_eq!(truncate_chars(short, MAX_ERROR_CHARS), "short");
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        // Multi-byte characters must not be split.
        let s = "é".repeat(10);
        assert_eq!(truncate_chars(&s, 3), "ééé");
    }
}
