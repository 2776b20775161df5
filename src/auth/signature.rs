//! HMAC-SHA256 request signing and verification.
//!
//! The canonical string bound by the signature is
//! `method ":" path ":" timestamp ":" request_id ":" body`, keyed with the
//! shared service secret. Verification recomputes the expected digest and
//! compares with a constant-time equality check so that response timing
//! never leaks the position of the first mismatched byte.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "X-Service-Auth";
/// Header carrying the unix-seconds request timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Service-Timestamp";
/// Header carrying the caller-chosen request id for tracing and replay scoping.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Compute the lowercase hex HMAC-SHA256 signature for a request.
pub fn compute_signature(
    secret: &SecretString,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: &str,
    request_id: &str,
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(method.as_bytes());
    mac.update(b":");
    mac.update(path.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(request_id.as_bytes());
    mac.update(b":");
    mac.update(body);
    hex_encode(&mac.finalize().into_bytes())
}

/// Verify a candidate signature against the expected digest in constant time.
///
/// Uppercase hex from the caller is accepted; everything else about the
/// candidate must match byte for byte.
pub fn verify_signature(
    secret: &SecretString,
    candidate: &str,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: &str,
    request_id: &str,
) -> bool {
    let expected = compute_signature(secret, method, path, body, timestamp, request_id);
    let candidate = candidate.to_ascii_lowercase();
    // subtle's slice ct_eq already returns false for mismatched lengths
    // without inspecting content.
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

/// The three wire headers attached to an outbound signed callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCallbackHeaders {
    pub signature: String,
    pub timestamp: String,
    pub request_id: String,
}

/// Produce the signed headers for an outbound callback.
///
/// `timestamp` defaults to the current unix time and `request_id` to a fresh
/// v4 UUID when not supplied; explicit values are used verbatim so callers
/// can retry a delivery under its original identity.
pub fn sign_callback(
    secret: &SecretString,
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: Option<i64>,
    request_id: Option<String>,
) -> SignedCallbackHeaders {
    let timestamp = timestamp
        .unwrap_or_else(|| Utc::now().timestamp())
        .to_string();
    let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let signature = compute_signature(secret, method, path, body, &timestamp, &request_id);
    SignedCallbackHeaders {
        signature,
        timestamp,
        request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-shared-secret")
    }

    #[test]
    fn signature_is_deterministic_lowercase_hex() {
        let a = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        let b = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        assert!(verify_signature(
            &secret(),
            &sig,
            "POST",
            "/api/v1/x",
            b"{}",
            "1700000000",
            "req-1"
        ));
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let sig = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        assert!(verify_signature(
            &secret(),
            &sig.to_ascii_uppercase(),
            "POST",
            "/api/v1/x",
            b"{}",
            "1700000000",
            "req-1"
        ));
    }

    #[test]
    fn any_field_mutation_flips_verification() {
        let sig = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        let cases: [(&str, &str, &[u8], &str, &str); 5] = [
            ("PUT", "/api/v1/x", b"{}", "1700000000", "req-1"),
            ("POST", "/api/v1/y", b"{}", "1700000000", "req-1"),
            ("POST", "/api/v1/x", b"{ }", "1700000000", "req-1"),
            ("POST", "/api/v1/x", b"{}", "1700000001", "req-1"),
            ("POST", "/api/v1/x", b"{}", "1700000000", "req-2"),
        ];
        for (method, path, body, ts, rid) in cases {
            assert!(
                !verify_signature(&secret(), &sig, method, path, body, ts, rid),
                "mutation {method} {path} {ts} {rid} should not verify"
            );
        }
    }

    #[test]
    fn candidate_mutations_at_first_and_last_byte_both_fail() {
        let sig = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        let flip = |s: &str, idx: usize| {
            let mut bytes = s.as_bytes().to_vec();
            bytes[idx] = if bytes[idx] == b'0' { b'1' } else { b'0' };
            String::from_utf8(bytes).unwrap()
        };
        let first = flip(&sig, 0);
        let last = flip(&sig, sig.len() - 1);
        for candidate in [first, last, String::new(), format!("{sig}00")] {
            assert!(!verify_signature(
                &secret(),
                &candidate,
                "POST",
                "/api/v1/x",
                b"{}",
                "1700000000",
                "req-1"
            ));
        }
    }

    #[test]
    fn wrong_secret_does_not_verify() {
        let sig = compute_signature(&secret(), "POST", "/api/v1/x", b"{}", "1700000000", "req-1");
        let other = SecretString::from("another-secret");
        assert!(!verify_signature(
            &other,
            &sig,
            "POST",
            "/api/v1/x",
            b"{}",
            "1700000000",
            "req-1"
        ));
    }

    #[test]
    fn sign_callback_defaults_verify_inbound() {
        let headers = sign_callback(&secret(), "POST", "/api/v1/x", b"{\"k\":1}", None, None);
        assert!(verify_signature(
            &secret(),
            &headers.signature,
            "POST",
            "/api/v1/x",
            b"{\"k\":1}",
            &headers.timestamp,
            &headers.request_id
        ));
        assert!(Uuid::parse_str(&headers.request_id).is_ok());
    }

    #[test]
    fn sign_callback_respects_explicit_identity() {
        let headers = sign_callback(
            &secret(),
            "POST",
            "/api/v1/x",
            b"{}",
            Some(1_700_000_123),
            Some("retry-7".to_string()),
        );
        assert_eq!(headers.timestamp, "1700000123");
        assert_eq!(headers.request_id, "retry-7");
    }
}
