//! Signature algorithm and verification for webhook deliveries.
//!
//! Every webhook body sent by the delivery engine is signed with
//! HMAC-SHA256. The wire format for the header is:
//!
//! ```text
//! Grcev-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{json_body}", secret)`
//! and the base64 alphabet is RFC 4648 without padding. Subscribers verify
//! with [`verify_body`] using the shared secret configured for their
//! subscription.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Grcev-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Signing / verification
// ---------------------------------------------------------------------------

/// Sign a JSON body with the current timestamp.
///
/// Returns the full `Grcev-Signature` header value (`{timestamp}.{b64}`).
pub fn sign_body(json_body: &str, key: &[u8]) -> String {
    sign_body_at(
        json_body,
        key,
        time::OffsetDateTime::now_utc().unix_timestamp(),
    )
}

/// Sign a JSON body with an explicit timestamp.
pub fn sign_body_at(json_body: &str, key: &[u8], timestamp: i64) -> String {
    let data = format!("{timestamp}.{json_body}");
    let signature = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
    );
    format_signature_header(timestamp, signature.as_ref())
}

/// Verify a received webhook body against its `Grcev-Signature` header.
///
/// Checks the HMAC over `"{timestamp}.{json_body}"` and then the
/// timestamp freshness, so a valid-but-replayed signature older than
/// [`MAX_SIGNATURE_AGE`] is rejected as [`SignatureError::Expired`].
pub fn verify_body(json_body: &str, header_value: &str, key: &[u8]) -> Result<(), SignatureError> {
    let (timestamp, signature) = parse_signature_header(header_value)?;
    let data = format!("{timestamp}.{json_body}");
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
        signature.as_ref(),
    )?;
    check_timestamp(timestamp)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `Grcev-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let dot_pos = value.find('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = value[..dot_pos]
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(&value[dot_pos + 1..])
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

// ---------------------------------------------------------------------------
// Timestamp validation
// ---------------------------------------------------------------------------

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"subscription-shared-secret";
    const BODY: &str = r#"{"EventId":"00000000-0000-0000-0000-000000000000"}"#;

    #[test]
    fn sign_then_verify_succeeds() {
        let header = sign_body(BODY, KEY);
        assert!(verify_body(BODY, &header, KEY).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_body(BODY, KEY);
        let tampered = BODY.replace('0', "1");
        assert!(matches!(
            verify_body(&tampered, &header, KEY),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let header = sign_body(BODY, KEY);
        assert!(matches!(
            verify_body(BODY, &header, b"some-other-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn stale_signature_is_rejected() {
        let stale = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 60;
        let header = sign_body_at(BODY, KEY, stale);
        assert!(matches!(
            verify_body(BODY, &header, KEY),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn header_round_trips_through_parser() {
        let header = sign_body_at(BODY, KEY, 1_700_000_000);
        let (timestamp, signature) = parse_signature_header(&header).unwrap();
        assert_eq!(timestamp, 1_700_000_000);
        assert_eq!(header, format_signature_header(timestamp, &signature));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("not-a-number.AAAA"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("1700000000.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
