//! Webhook signature primitives shared by the provider adapters.
//!
//! Signatures are always computed over the exact raw request bytes, never a
//! re-serialized object, and compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a provided hex signature against the
/// expected HMAC of the payload.
pub fn verify_hmac_sha256(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let expected = hmac_sha256_hex(payload, secret);
    expected
        .as_bytes()
        .ct_eq(signature_hex.trim().as_bytes())
        .into()
}

/// Constant-time equality of two shared-secret tokens.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.trim().as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Verifies a Stripe-style signature header: `t=<unix>,v1=<hex>[,v1=...]`,
/// HMAC over `"{t}.{body}"`, rejecting timestamps outside `tolerance_secs`
/// of `now` (replay defense).
pub fn verify_timestamped_v1(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }

    let Some(ts) = timestamp else {
        return false;
    };
    if candidates.is_empty() || (now_unix - ts).abs() > tolerance_secs {
        return false;
    }

    let signed_payload = format!("{}.{}", ts, String::from_utf8_lossy(payload));
    let expected = hmac_sha256_hex(signed_payload.as_bytes(), secret);

    candidates
        .iter()
        .any(|c| bool::from(expected.as_bytes().ct_eq(c.trim().as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_round_trip() {
        let payload = br#"{"event":"payment.paid"}"#;
        let sig = hmac_sha256_hex(payload, "whsec_123");
        assert!(verify_hmac_sha256(payload, &sig, "whsec_123"));
        assert!(!verify_hmac_sha256(payload, &sig, "wrong_secret"));
        assert!(!verify_hmac_sha256(b"tampered", &sig, "whsec_123"));
    }

    #[test]
    fn test_timestamped_v1_valid() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let signed = format!("{}.{}", now, String::from_utf8_lossy(payload));
        let sig = hmac_sha256_hex(signed.as_bytes(), "whsec_123");
        let header = format!("t={now},v1={sig}");
        assert!(verify_timestamped_v1(payload, &header, "whsec_123", 300, now));
    }

    #[test]
    fn test_timestamped_v1_stale() {
        let payload = b"{}";
        let then = 1_700_000_000;
        let signed = format!("{}.{}", then, String::from_utf8_lossy(payload));
        let sig = hmac_sha256_hex(signed.as_bytes(), "whsec_123");
        let header = format!("t={then},v1={sig}");
        // 10 minutes later, 5 minute tolerance
        assert!(!verify_timestamped_v1(
            payload,
            &header,
            "whsec_123",
            300,
            then + 600
        ));
    }

    #[test]
    fn test_timestamped_v1_missing_parts() {
        let payload = b"{}";
        assert!(!verify_timestamped_v1(payload, "v1=abc", "s", 300, 0));
        assert!(!verify_timestamped_v1(payload, "t=123", "s", 300, 123));
        assert!(!verify_timestamped_v1(payload, "", "s", 300, 0));
    }

    #[test]
    fn test_token_compare() {
        assert!(tokens_match(" tok_abc ", "tok_abc"));
        assert!(!tokens_match("tok_abc", "tok_abd"));
    }
}
