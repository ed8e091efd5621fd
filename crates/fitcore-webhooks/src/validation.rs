//! Validation for subscription input: delivery URLs, SSRF protection,
//! event-type patterns, custom headers, and rate limits.

use std::net::IpAddr;

use crate::error::WebhookError;
use crate::matcher;
use crate::models::WebhookEventType;

/// Upper bound on custom headers per subscription.
const MAX_CUSTOM_HEADERS: usize = 20;

/// Upper bound on a custom header value length.
const MAX_HEADER_VALUE_LEN: usize = 1024;

/// Headers the dispatcher sets itself; subscriptions may not override them.
const RESERVED_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "host",
    "x-webhook-signature",
    "x-webhook-timestamp",
    "x-event-id",
];

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate a webhook delivery URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is true for dev/test)
/// 3. Host is not a private/internal address (SSRF protection)
pub fn validate_webhook_url(url: &str, allow_http: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Webhook URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    validate_host_not_internal(host)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Validate that a host is not a private/internal address.
///
/// Blocks loopback, RFC 1918 ranges, link-local (cloud metadata endpoints),
/// CGNAT, IPv6 loopback/unspecified, and internal hostname suffixes.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

/// Check if an IP address belongs to a private/internal range.
fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()                // 127.0.0.0/8
                || v4.is_private()          // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_link_local()       // 169.254.0.0/16
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10 (CGNAT)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Event pattern validation
// ---------------------------------------------------------------------------

/// Validate subscription event patterns.
///
/// Each pattern must be a known event type or the `"*"` wildcard; the list
/// must not be empty (a subscription listening for nothing is a mistake).
pub fn validate_event_patterns(patterns: &[String]) -> Result<(), WebhookError> {
    if patterns.is_empty() {
        return Err(WebhookError::Validation(
            "At least one event type is required".to_string(),
        ));
    }

    for pattern in patterns {
        if pattern != matcher::WILDCARD && WebhookEventType::parse(pattern).is_none() {
            return Err(WebhookError::Validation(format!(
                "Unknown event type: {pattern}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

/// Validate the custom headers object for a subscription.
///
/// Must be a JSON object of string values; names may not collide with
/// headers the dispatcher sets itself.
pub fn validate_headers(headers: &serde_json::Value) -> Result<(), WebhookError> {
    let map = headers.as_object().ok_or_else(|| {
        WebhookError::Validation("headers must be a JSON object".to_string())
    })?;

    if map.len() > MAX_CUSTOM_HEADERS {
        return Err(WebhookError::Validation(format!(
            "At most {MAX_CUSTOM_HEADERS} custom headers are allowed"
        )));
    }

    for (name, value) in map {
        if name.is_empty() || !name.is_ascii() {
            return Err(WebhookError::Validation(format!(
                "Invalid header name: {name:?}"
            )));
        }
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            return Err(WebhookError::Validation(format!(
                "Header {name} is reserved"
            )));
        }
        match value.as_str() {
            Some(v) if v.len() <= MAX_HEADER_VALUE_LEN => {}
            Some(_) => {
                return Err(WebhookError::Validation(format!(
                    "Header {name} value exceeds {MAX_HEADER_VALUE_LEN} bytes"
                )));
            }
            None => {
                return Err(WebhookError::Validation(format!(
                    "Header {name} value must be a string"
                )));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Rate limit validation
// ---------------------------------------------------------------------------

/// Validate a per-minute rate limit.
pub fn validate_rate_limit(rate_limit_per_minute: i32) -> Result<(), WebhookError> {
    if rate_limit_per_minute <= 0 {
        return Err(WebhookError::Validation(
            "rate_limit_per_minute must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- URL validation ---

    #[test]
    fn test_valid_https_url() {
        assert!(validate_webhook_url("https://example.com/hooks", false).is_ok());
    }

    #[test]
    fn test_valid_https_url_with_port() {
        assert!(validate_webhook_url("https://hooks.example.com:8443/cb", false).is_ok());
    }

    #[test]
    fn test_http_url_rejected_by_default() {
        let result = validate_webhook_url("http://example.com/hooks", false);
        assert!(matches!(result.unwrap_err(), WebhookError::InvalidUrl(_)));
    }

    #[test]
    fn test_http_url_allowed_in_dev() {
        assert!(validate_webhook_url("http://example.com/hooks", true).is_ok());
    }

    #[test]
    fn test_invalid_url_format() {
        assert!(validate_webhook_url("not-a-url", false).is_err());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(validate_webhook_url("ftp://example.com/hooks", false).is_err());
    }

    // --- SSRF protection ---

    #[test]
    fn test_ssrf_blocks_loopback() {
        assert!(validate_host_not_internal("127.0.0.1").is_err());
    }

    #[test]
    fn test_ssrf_blocks_private_ranges() {
        assert!(validate_host_not_internal("10.0.0.1").is_err());
        assert!(validate_host_not_internal("172.16.0.1").is_err());
        assert!(validate_host_not_internal("192.168.1.1").is_err());
    }

    #[test]
    fn test_ssrf_blocks_metadata_endpoint() {
        assert!(validate_host_not_internal("169.254.169.254").is_err());
        assert!(validate_host_not_internal("metadata.google.internal").is_err());
    }

    #[test]
    fn test_ssrf_blocks_cgnat() {
        assert!(validate_host_not_internal("100.64.0.1").is_err());
    }

    #[test]
    fn test_ssrf_blocks_ipv6_loopback() {
        assert!(validate_host_not_internal("::1").is_err());
        assert!(validate_host_not_internal("::").is_err());
    }

    #[test]
    fn test_ssrf_blocks_internal_hostnames() {
        assert!(validate_host_not_internal("localhost").is_err());
        assert!(validate_host_not_internal("LOCALHOST").is_err());
        assert!(validate_host_not_internal("db.internal").is_err());
        assert!(validate_host_not_internal("printer.local").is_err());
    }

    #[test]
    fn test_ssrf_allows_public_destinations() {
        assert!(validate_host_not_internal("8.8.8.8").is_ok());
        assert!(validate_host_not_internal("hooks.example.io").is_ok());
    }

    #[test]
    fn test_ssrf_url_integration() {
        let result = validate_webhook_url("https://10.0.0.1/hook", false);
        assert!(matches!(result.unwrap_err(), WebhookError::SsrfDetected(_)));
    }

    // --- Event pattern validation ---

    #[test]
    fn test_valid_event_patterns() {
        let patterns = vec![
            "member.created".to_string(),
            "invoice.paid".to_string(),
        ];
        assert!(validate_event_patterns(&patterns).is_ok());
    }

    #[test]
    fn test_wildcard_pattern_is_valid() {
        assert!(validate_event_patterns(&["*".to_string()]).is_ok());
    }

    #[test]
    fn test_unknown_event_pattern() {
        let patterns = vec!["member.created".to_string(), "bogus.event".to_string()];
        let err = validate_event_patterns(&patterns).unwrap_err();
        assert!(err.to_string().contains("bogus.event"));
    }

    #[test]
    fn test_empty_patterns_rejected() {
        assert!(validate_event_patterns(&[]).is_err());
    }

    // --- Header validation ---

    #[test]
    fn test_valid_headers() {
        let headers = serde_json::json!({
            "Authorization": "Bearer token",
            "X-Club-Region": "eu-west"
        });
        assert!(validate_headers(&headers).is_ok());
    }

    #[test]
    fn test_empty_headers_object() {
        assert!(validate_headers(&serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_headers_must_be_object() {
        assert!(validate_headers(&serde_json::json!(["a", "b"])).is_err());
        assert!(validate_headers(&serde_json::json!("x")).is_err());
    }

    #[test]
    fn test_reserved_header_rejected() {
        for name in ["Content-Type", "X-Webhook-Signature", "host"] {
            let headers = serde_json::json!({ name: "v" });
            assert!(validate_headers(&headers).is_err(), "{name} should be reserved");
        }
    }

    #[test]
    fn test_non_string_header_value_rejected() {
        assert!(validate_headers(&serde_json::json!({"X-Count": 5})).is_err());
    }

    #[test]
    fn test_too_many_headers_rejected() {
        let mut map = serde_json::Map::new();
        for i in 0..21 {
            map.insert(format!("X-Custom-{i}"), serde_json::json!("v"));
        }
        assert!(validate_headers(&serde_json::Value::Object(map)).is_err());
    }

    // --- Rate limit validation ---

    #[test]
    fn test_rate_limit_must_be_positive() {
        assert!(validate_rate_limit(0).is_err());
        assert!(validate_rate_limit(-5).is_err());
        assert!(validate_rate_limit(1).is_ok());
        assert!(validate_rate_limit(60).is_ok());
    }
}
