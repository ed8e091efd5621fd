//! Common test utilities for fitcore-webhooks integration tests.
//!
//! Provides mock-server responders, a test delivery client mirroring the
//! dispatcher's wire format, and fitness-domain payload fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use fitcore_webhooks::models::WebhookPayload;

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test tenant IDs (two clubs).
pub const CLUB_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const CLUB_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// Standard test member ID.
pub const MEMBER_1: Uuid = Uuid::from_bytes([
    0xaa, 0xaa, 0x11, 0x11, 0xaa, 0xaa, 0x11, 0x11, 0xaa, 0xaa, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

/// Standard test secrets.
pub const SECRET_1: &str = "whsec_test_secret_key_12345";
pub const SECRET_2: &str = "whsec_another_secret_67890";

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self::fail_with_status(n, 500)
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that delays before responding, for timeout tests.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
}

impl DelayedResponder {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// Signature helpers
// ---------------------------------------------------------------------------

/// Compute an HMAC-SHA256 signature independently of the crypto module,
/// mirroring what a receiver implements from the docs.
pub fn compute_test_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a webhook signature from a captured request.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    let Some(signature_header) = request.header("x-webhook-signature") else {
        return false;
    };
    let Some(timestamp) = request.header("x-webhook-timestamp") else {
        return false;
    };

    // Expected format: "sha256={hex}"
    let expected = format!(
        "sha256={}",
        compute_test_signature(secret, timestamp, &request.body)
    );

    signature_header == expected
}

// ---------------------------------------------------------------------------
// Test HTTP client mirroring the dispatcher's wire format
// ---------------------------------------------------------------------------

/// HTTP client that sends deliveries exactly as the dispatcher does.
pub struct TestWebhookClient {
    client: reqwest::Client,
}

impl TestWebhookClient {
    /// Create a new test client with the production 10s timeout.
    pub fn new() -> Self {
        Self::with_timeout_ms(10_000)
    }

    /// Create a test client with a custom timeout, for timeout tests.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Deliver a webhook payload to a URL with optional signature and
    /// custom headers.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &WebhookPayload,
        secret: Option<&str>,
        custom_headers: Option<&HashMap<String, String>>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let body = serde_json::to_vec(payload).expect("Failed to serialize payload");
        let timestamp = Utc::now().timestamp().to_string();

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Timestamp", &timestamp)
            .header("X-Event-ID", payload.event_id.to_string());

        if let Some(headers) = custom_headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        if let Some(secret) = secret {
            let signature = compute_test_signature(secret, &timestamp, &body);
            request = request.header("X-Webhook-Signature", format!("sha256={signature}"));
        }

        request.body(body).send().await
    }
}

impl Default for TestWebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Payload fixtures
// ---------------------------------------------------------------------------

/// Payload for a member.created event.
pub fn member_created_payload(tenant_id: Uuid, member_id: Uuid) -> WebhookPayload {
    WebhookPayload {
        event_id: Uuid::new_v4(),
        event_type: "member.created".to_string(),
        timestamp: Utc::now(),
        tenant_id,
        data: serde_json::json!({
            "member_id": member_id.to_string(),
            "email": "alex@example.com",
            "plan": "unlimited-monthly"
        }),
    }
}

/// Payload for an invoice.paid event.
pub fn invoice_paid_payload(tenant_id: Uuid, member_id: Uuid) -> WebhookPayload {
    WebhookPayload {
        event_id: Uuid::new_v4(),
        event_type: "invoice.paid".to_string(),
        timestamp: Utc::now(),
        tenant_id,
        data: serde_json::json!({
            "member_id": member_id.to_string(),
            "invoice_id": "inv_2026_0042",
            "amount_cents": 5900,
            "currency": "EUR"
        }),
    }
}

/// Create a custom test webhook payload.
pub fn custom_payload(
    tenant_id: Uuid,
    event_type: &str,
    data: serde_json::Value,
) -> WebhookPayload {
    WebhookPayload {
        event_id: Uuid::new_v4(),
        event_type: event_type.to_string(),
        timestamp: Utc::now(),
        tenant_id,
        data,
    }
}
