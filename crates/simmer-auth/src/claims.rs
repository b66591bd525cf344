//! Best-effort subject extraction from unverified credentials
//!
//! Cache lookups need a subject identifier before the authoritative
//! verifier has been consulted, otherwise every request would pay the
//! remote round-trip the cache exists to avoid. This module peeks into
//! the payload segment of a three-part (header.payload.signature) token
//! and pulls out a subject claim without checking any signature.
//!
//! ## Security Considerations
//!
//! The returned value is UNVERIFIED and must never be treated as an
//! authenticated identity. Its only legitimate use is computing a cache
//! key. If a forged token names someone else's subject, the lookup simply
//! misses (the fingerprint differs) and the request falls through to the
//! real verifier.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

/// Claim names that may carry the subject identifier, tried in priority
/// order. The first present, non-empty value wins.
pub const SUBJECT_CLAIMS: &[&str] = &["sub", "user_id", "id"];

/// Extract a subject identifier from a credential's payload segment.
///
/// Returns `None` for anything that is not shaped like a three-segment
/// token, for payloads that fail base64 or JSON decoding, and for payloads
/// carrying none of the [`SUBJECT_CLAIMS`]. Never fails louder than
/// `None`: a malformed credential is an expected input here, not an error.
#[must_use]
pub fn unverified_subject(token: &str) -> Option<String> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let payload = decode_segment(segments[1])?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    SUBJECT_CLAIMS
        .iter()
        .find_map(|claim| subject_value(claims.get(*claim)?))
}

/// Tokens canonically use the unpadded URL-safe alphabet; some emitters
/// use the standard alphabet with padding instead.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD.decode(segment))
        .ok()
}

fn subject_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
