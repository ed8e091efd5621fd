//! Cryptographic operations for webhook secrets and payload signing.
//!
//! - Secret generation for new and rotated subscriptions
//! - AES-256-GCM encryption/decryption for signing secrets at rest
//! - HMAC-SHA256 computation for outgoing payload signatures

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Random bytes in a generated signing secret.
const SECRET_BYTES: usize = 24;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Secret generation
// ---------------------------------------------------------------------------

/// Generate a fresh signing secret: `whsec_` followed by 48 hex characters.
///
/// Used when a subscription is created without a caller-supplied secret and
/// on every secret rotation.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// AES-256-GCM encryption/decryption (for secrets at rest)
// ---------------------------------------------------------------------------

/// Encrypt a plaintext secret to a base64-encoded string for DB storage.
///
/// Format: base64(nonce || ciphertext || auth_tag)
pub fn encrypt_secret(plaintext: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&result))
}

/// Decrypt a base64-encoded secret from DB storage back to plaintext.
pub fn decrypt_secret(encoded: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let encrypted = BASE64
        .decode(encoded)
        .map_err(|e| WebhookError::EncryptionFailed(format!("Base64 decode failed: {e}")))?;

    if encrypted.len() < NONCE_SIZE + 1 {
        return Err(WebhookError::EncryptionFailed(
            "Invalid encrypted data format".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
    let ciphertext = &encrypted[NONCE_SIZE..];

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Compute the HMAC-SHA256 signature for an outgoing delivery.
///
/// The signature covers `{timestamp}.{body}` so a receiver can reject
/// replayed payloads. Returns the hex-encoded MAC.
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a payload signature using constant-time comparison.
pub fn verify_signature(expected_hex: &str, secret: &str, timestamp: &str, body: &[u8]) -> bool {
    let computed = sign_payload(secret, timestamp, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    // --- Secret generation ---

    #[test]
    fn test_generated_secret_format() {
        let secret = generate_secret();
        assert!(secret.starts_with("whsec_"));
        let hex_part = &secret["whsec_".len()..];
        assert_eq!(hex_part.len(), SECRET_BYTES * 2);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    // --- AES-GCM tests ---

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = "whsec_0123456789abcdef0123456789abcdef";

        let encrypted = encrypt_secret(plaintext, &key).expect("encryption failed");
        let decrypted = decrypt_secret(&encrypted, &key).expect("decryption failed");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_random_nonce_changes_ciphertext() {
        let key = test_key();
        let enc1 = encrypt_secret("same-secret", &key).unwrap();
        let enc2 = encrypt_secret("same-secret", &key).unwrap();
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        let result = encrypt_secret("test", &short_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let encrypted = encrypt_secret("secret", &[0x42u8; 32]).unwrap();
        assert!(decrypt_secret(&encrypted, &[0x43u8; 32]).is_err());
    }

    #[test]
    fn test_decrypt_invalid_base64() {
        assert!(decrypt_secret("not-valid-base64!!!", &test_key()).is_err());
    }

    #[test]
    fn test_decrypt_truncated_input() {
        let short = BASE64.encode([0u8; 5]);
        assert!(decrypt_secret(&short, &test_key()).is_err());
    }

    // --- HMAC-SHA256 tests ---

    #[test]
    fn test_signature_deterministic() {
        let sig1 = sign_payload("secret", "1754600000", b"payload");
        let sig2 = sign_payload("secret", "1754600000", b"payload");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        assert_ne!(
            sign_payload("secret1", "1754600000", b"payload"),
            sign_payload("secret2", "1754600000", b"payload")
        );
    }

    #[test]
    fn test_signature_depends_on_timestamp() {
        assert_ne!(
            sign_payload("secret", "1754600000", b"payload"),
            sign_payload("secret", "1754600001", b"payload")
        );
    }

    #[test]
    fn test_signature_depends_on_body() {
        assert_ne!(
            sign_payload("secret", "1754600000", b"payload1"),
            sign_payload("secret", "1754600000", b"payload2")
        );
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = sign_payload("secret", "1754600000", b"payload");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_signature_valid() {
        let sig = sign_payload("secret", "1754600000", b"body");
        assert!(verify_signature(&sig, "secret", "1754600000", b"body"));
    }

    #[test]
    fn test_verify_signature_invalid() {
        assert!(!verify_signature(
            "deadbeef",
            "secret",
            "1754600000",
            b"body"
        ));
    }
}
