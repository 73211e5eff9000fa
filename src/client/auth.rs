use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{ClientError, ClientResult};

type HmacSha256 = Hmac<Sha256>;

/// Secrets are issued base64-encoded; some tooling hands them back in the
/// URL-safe alphabet, so normalize before decoding.
fn normalize_base64_secret(secret: &str) -> String {
    secret
        .chars()
        .filter_map(|c| match c {
            '-' => Some('+'),
            '_' => Some('/'),
            'A'..='Z' | 'a'..='z' | '0'..='9' | '+' | '/' | '=' => Some(c),
            _ => None,
        })
        .collect()
}

/// Build the HMAC-SHA256 signature the venue expects on signed requests.
///
/// The signed message is `{timestamp}{method}{path}` with the JSON body
/// appended when present; the signature is returned URL-safe base64.
pub fn build_request_signature(
    secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: Option<&str>,
) -> ClientResult<String> {
    let mut message = format!("{timestamp}{method}{request_path}");
    if let Some(body) = body {
        message.push_str(body);
    }

    let key_bytes = BASE64_STANDARD
        .decode(normalize_base64_secret(secret))
        .map_err(|e| ClientError::Hmac(format!("invalid base64 secret: {e}")))?;

    let mut mac =
        HmacSha256::new_from_slice(&key_bytes).map_err(|e| ClientError::Hmac(e.to_string()))?;
    mac.update(message.as_bytes());
    let signature = mac.finalize().into_bytes();

    let b64 = BASE64_STANDARD.encode(signature);
    Ok(b64.replace('+', "-").replace('/', "_"))
}

/// Current UNIX timestamp in seconds, used as the signing timestamp.
pub fn current_unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA==";

    #[test]
    fn signature_is_deterministic() {
        let a = build_request_signature(SECRET, 1700000000, "POST", "/auctions/auc_1/bids", None)
            .unwrap();
        let b = build_request_signature(SECRET, 1700000000, "POST", "/auctions/auc_1/bids", None)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn body_changes_the_signature() {
        let without =
            build_request_signature(SECRET, 1700000000, "POST", "/bids", None).unwrap();
        let with = build_request_signature(SECRET, 1700000000, "POST", "/bids", Some("{}"))
            .unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn url_safe_secret_is_accepted() {
        // Same key material in the URL-safe alphabet must verify identically.
        let url_safe = SECRET.replace('+', "-").replace('/', "_");
        let a = build_request_signature(SECRET, 1, "GET", "/bids/1", None).unwrap();
        let b = build_request_signature(&url_safe, 1, "GET", "/bids/1", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_secret_is_rejected() {
        // A single base64 symbol can never form a valid encoding.
        assert!(build_request_signature("A", 1, "GET", "/", None).is_err());
    }
}
