//! Integration tests for HMAC-SHA256 payload signing.
//!
//! Verify signatures are generated, carried in the right header, and can be
//! recomputed by a receiver that only knows the shared secret.

#![cfg(feature = "integration")]

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use fitcore_webhooks::crypto::{sign_payload, verify_signature};

/// Signature header is present and prefixed when a secret is configured.
#[tokio::test]
async fn test_signature_header_present() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = member_created_payload(CLUB_A, MEMBER_1);
    let url = format!("{}/hook", mock_server.uri());

    client
        .deliver(&url, &payload, Some(SECRET_1), None)
        .await
        .unwrap();

    let captured = &capture.requests()[0];
    let signature = captured.header("x-webhook-signature");

    assert!(signature.is_some(), "X-Webhook-Signature should be present");
    assert!(
        signature.unwrap().starts_with("sha256="),
        "Signature should start with 'sha256='"
    );
}

/// Signature format is sha256= followed by 64 hex characters.
#[tokio::test]
async fn test_signature_format() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = invoice_paid_payload(CLUB_A, MEMBER_1);
    let url = format!("{}/hook", mock_server.uri());

    client
        .deliver(&url, &payload, Some(SECRET_1), None)
        .await
        .unwrap();

    let captured = &capture.requests()[0];
    let signature = captured.header("x-webhook-signature").unwrap();
    let hex_part = signature.strip_prefix("sha256=").unwrap();

    assert_eq!(hex_part.len(), 64);
    assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
}

/// A receiver knowing the secret can verify the captured request.
#[tokio::test]
async fn test_receiver_can_verify_signature() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = member_created_payload(CLUB_A, MEMBER_1);
    let url = format!("{}/hook", mock_server.uri());

    client
        .deliver(&url, &payload, Some(SECRET_1), None)
        .await
        .unwrap();

    let captured = &capture.requests()[0];
    assert!(verify_captured_signature(captured, SECRET_1));
}

/// Verification fails with the wrong secret.
#[tokio::test]
async fn test_wrong_secret_fails_verification() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = member_created_payload(CLUB_A, MEMBER_1);
    let url = format!("{}/hook", mock_server.uri());

    client
        .deliver(&url, &payload, Some(SECRET_1), None)
        .await
        .unwrap();

    let captured = &capture.requests()[0];
    assert!(!verify_captured_signature(captured, SECRET_2));
}

/// A tampered body no longer verifies.
#[tokio::test]
async fn test_tampered_body_fails_verification() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let client = TestWebhookClient::new();
    let payload = invoice_paid_payload(CLUB_A, MEMBER_1);
    let url = format!("{}/hook", mock_server.uri());

    client
        .deliver(&url, &payload, Some(SECRET_1), None)
        .await
        .unwrap();

    let mut captured = capture.requests()[0].clone();
    captured.body = b"{\"amount_cents\": 0}".to_vec();

    assert!(!verify_captured_signature(&captured, SECRET_1));
}

/// The crate's own sign/verify pair agrees with the receiver-side recipe.
#[tokio::test]
async fn test_crypto_module_matches_receiver_recipe() {
    let body = br#"{"event_type":"invoice.paid"}"#;
    let timestamp = "1754600000";

    let ours = sign_payload(SECRET_1, timestamp, body);
    let theirs = compute_test_signature(SECRET_1, timestamp, body);

    assert_eq!(ours, theirs);
    assert!(verify_signature(&theirs, SECRET_1, timestamp, body));
}
