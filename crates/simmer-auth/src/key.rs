//! Cache key derivation
//!
//! Every cached identity is addressed by a three-part scoped key:
//!
//! ```text
//! auth:{app_scope}:{subject_id}:{fingerprint}
//! ```
//!
//! - `app_scope` prevents cross-tenant cache bleed under a shared store.
//! - `subject_id` lets one user's entries be invalidated without a full
//!   flush (see [`subject_pattern`]).
//! - `fingerprint` ties the entry to one concrete credential, so a rotated
//!   or revoked token misses the cache naturally (new hash, new key)
//!   without any active invalidation on refresh.
//!
//! ## Security Considerations
//!
//! The fingerprint is NOT a cryptographic hash. It exists to keep keys
//! short and to distinguish "probably a different token", never to protect
//! the token's secrecy or integrity. Collisions are tolerated: every read
//! re-checks the scope and fingerprint stored inside the cached value
//! before trusting it.

const KEY_PREFIX: &str = "auth";

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Deterministic, non-cryptographic fingerprint of a credential string.
///
/// The empty string maps to the literal `"0"`. Any other input is folded
/// character by character into a 32-bit signed accumulator
/// (`acc = acc * 31 + ch`, wrapping on overflow) and the absolute value is
/// rendered in lowercase base 36. Pure: no I/O, no randomness.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    if token.is_empty() {
        return "0".to_string();
    }

    let mut acc: i32 = 0;
    for ch in token.chars() {
        acc = acc.wrapping_mul(31).wrapping_add(ch as i32);
    }
    to_base36(acc.unsigned_abs())
}

/// Build the scoped cache key for one `(app_scope, subject, credential)`
/// combination. Pure and total.
#[must_use]
pub fn identity_key(app_scope: &str, subject_id: &str, fingerprint: &str) -> String {
    format!("{KEY_PREFIX}:{app_scope}:{subject_id}:{fingerprint}")
}

/// Build the glob pattern matching every cached entry for one subject,
/// regardless of which credential produced it. Used for store-side prefix
/// invalidation on logout or credential rotation.
#[must_use]
pub fn subject_pattern(app_scope: &str, subject_id: &str) -> String {
    format!("{KEY_PREFIX}:{app_scope}:{subject_id}:*")
}

fn to_base36(mut value: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(7);
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    // Digits are drawn from a fixed ASCII table.
    String::from_utf8_lossy(&digits).into_owned()
}
