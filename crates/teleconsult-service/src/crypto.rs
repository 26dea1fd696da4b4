//! Cryptographic utilities for webhook verification.
//!
//! The processor signs notifications with an `x-signature` header of the form
//! `ts=<unix>,v1=<hex hmac>`. The HMAC-SHA256 covers the manifest
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`, omitting absent parts.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Webhook signature verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No `x-signature` header.
    #[error("missing signature header")]
    Missing,
    /// Header is not `ts=..,v1=..`.
    #[error("malformed signature header")]
    Malformed,
    /// HMAC did not match.
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// Returns `None` only if the HMAC implementation rejects the key, which
/// HMAC-SHA256 never does for any key length.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Split an `x-signature` header into `(ts, v1)`.
#[must_use]
pub fn parse_signature_header(header: &str) -> Option<(&str, &str)> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    ts.zip(v1).filter(|(t, v)| !t.is_empty() && !v.is_empty())
}

/// Build the signed manifest.
#[must_use]
pub fn signature_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{request_id};"));
    }
    manifest.push_str(&format!("ts:{ts};"));
    manifest
}

/// Verify a processor webhook signature.
///
/// # Errors
///
/// Returns a [`SignatureError`] describing why the signature was rejected.
pub fn verify_webhook_signature(
    secret: &str,
    signature_header: Option<&str>,
    data_id: Option<&str>,
    request_id: Option<&str>,
) -> Result<(), SignatureError> {
    let header = signature_header.ok_or(SignatureError::Missing)?;
    let (ts, v1) = parse_signature_header(header).ok_or(SignatureError::Malformed)?;

    let expected = hmac_sha256_hex(secret, &signature_manifest(data_id, request_id, ts))
        .ok_or(SignatureError::Mismatch)?;

    if constant_time_eq(&expected, &v1.to_lowercase()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
