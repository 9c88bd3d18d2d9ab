//! Security utilities for input validation and request signing.
//!
//! This module provides:
//! - Order ID validation
//! - Segment URL validation (SSRF protection for finalize)
//! - Payment webhook signature verification

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use url::Url;

use santa_pipeline::is_internal_host;

/// Maximum URL length to prevent DoS attacks.
const MAX_URL_LENGTH: usize = 2048;

/// Validate order ID format.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_order_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Check a caller-supplied segment URL before the stitcher fetches it.
///
/// An empty `allowed_hosts` admits any public host.
pub fn validate_segment_url(raw: &str, allowed_hosts: &[String]) -> Result<(), String> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        ));
    }

    let url = Url::parse(raw).map_err(|e| format!("Invalid URL '{}': {}", raw, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("Unsupported URL scheme '{}'", url.scheme()));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err("Segment URL must not carry credentials".to_string());
    }

    if is_internal_host(&url) {
        warn!(url = %raw, "Blocked internal segment URL");
        return Err("Segment URL points to an internal address".to_string());
    }

    let host = url
        .host_str()
        .ok_or_else(|| format!("URL '{}' has no host", raw))?
        .to_lowercase();

    if allowed_hosts.is_empty() {
        return Ok(());
    }
    let allowed = allowed_hosts.iter().any(|h| {
        let h = h.to_lowercase();
        host == h || host.ends_with(&format!(".{}", h))
    });
    if allowed {
        Ok(())
    } else {
        Err(format!("Segment host '{}' is not allowed", host))
    }
}

/// Why a signed payment event was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Malformed,
    Stale,
    Mismatch,
}

/// Verify `signature` = base64(HMAC-SHA256(secret, "{timestamp}.{body}")).
///
/// `timestamp` is unix seconds and must lie within `tolerance_secs` of `now`.
/// The MAC comparison is constant time.
pub fn verify_payment_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
    tolerance_secs: u64,
) -> Result<(), SignatureError> {
    type HmacSha256 = Hmac<Sha256>;

    let ts: i64 = timestamp.trim().parse().map_err(|_| SignatureError::Malformed)?;
    if now.abs_diff(ts) > tolerance_secs {
        return Err(SignatureError::Stale);
    }

    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.trim().as_bytes());
    mac.update(b".");
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produce the signature header value for a payload. Used by tests and tooling.
pub fn sign_payment_event(secret: &str, timestamp: i64, body: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;

    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_validation() {
        assert!(is_valid_order_id("12345678"));
        assert!(is_valid_order_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_order_id("short"));
        assert!(!is_valid_order_id("has/slash-in-it"));
        assert!(!is_valid_order_id("has..dots..inside"));
        assert!(!is_valid_order_id(&"a".repeat(65)));
    }

    #[test]
    fn test_segment_url_blocks_internal_targets() {
        for url in [
            "http://127.0.0.1/a.mp4",
            "http://localhost:8080/a.mp4",
            "http://192.168.1.10/a.mp4",
            "http://169.254.169.254/latest/meta-data/",
            "http://metadata.google.internal/computeMetadata",
            "http://user@127.0.0.1/x.mp4",
            "http://2130706433/x.mp4",
            "http://0x7f000001/x",
            "http://[::ffff:169.254.169.254]/x",
            "http://[::1]:8080/x",
            "http://10.0.0.5/x.mp4",
            "http://api.localhost/x.mp4",
        ] {
            assert!(validate_segment_url(url, &[]).is_err(), "{}", url);
        }
    }

    #[test]
    fn test_segment_url_rejects_credentials() {
        assert!(validate_segment_url("https://user:pw@cdn.example.com/a.mp4", &[]).is_err());
        assert!(validate_segment_url("https://user@cdn.example.com/a.mp4", &[]).is_err());
    }

    #[test]
    fn test_segment_url_allowlist_does_not_admit_internal_hosts() {
        let allowed = vec!["internal".to_string()];
        assert!(validate_segment_url("http://metadata.google.internal/x", &allowed).is_err());
    }

    #[test]
    fn test_segment_url_scheme_and_allowlist() {
        let allowed = vec!["cdn.example.com".to_string()];

        assert!(validate_segment_url("ftp://cdn.example.com/a.mp4", &allowed).is_err());
        assert!(validate_segment_url("https://cdn.example.com/a.mp4", &allowed).is_ok());
        assert!(validate_segment_url("https://eu.cdn.example.com/a.mp4", &allowed).is_ok());
        assert!(validate_segment_url("https://evil.com/a.mp4", &allowed).is_err());
        assert!(validate_segment_url("https://evil.com/a.mp4", &[]).is_ok());
    }

    #[test]
    fn test_payment_signature_round_trip() {
        let body = br#"{"orderId":"order-1234","paymentReference":"pay_1"}"#;
        let sig = sign_payment_event("whsec", 1_700_000_000, body);

        assert_eq!(
            verify_payment_signature("whsec", "1700000000", body, &sig, 1_700_000_030, 300),
            Ok(())
        );
    }

    #[test]
    fn test_payment_signature_rejections() {
        let body = b"{}";
        let sig = sign_payment_event("whsec", 1_700_000_000, body);

        assert_eq!(
            verify_payment_signature("other", "1700000000", body, &sig, 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_payment_signature("whsec", "1700000000", b"{ }", &sig, 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_payment_signature("whsec", "1700000000", body, &sig, 1_700_001_000, 300),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verify_payment_signature("whsec", "soon", body, &sig, 1_700_000_000, 300),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_payment_signature("whsec", "1700000000", body, "%%%", 1_700_000_000, 300),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_payment_signature_extreme_timestamps_are_stale() {
        let body = b"{}";
        for ts in [i64::MIN, i64::MAX] {
            let sig = sign_payment_event("whsec", ts, body);
            assert_eq!(
                verify_payment_signature("whsec", &ts.to_string(), body, &sig, 1_700_000_000, 300),
                Err(SignatureError::Stale),
                "{}",
                ts
            );
        }
        assert_eq!(
            verify_payment_signature("whsec", "0", body, "AAAA", i64::MAX, u64::MAX),
            Err(SignatureError::Mismatch)
        );
    }
}
