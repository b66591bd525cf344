//! Identity records held by the cache tiers

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A verified user identity as reported by the authoritative verifier.
///
/// Cache tiers treat this record as immutable: entries are replaced
/// wholesale on re-verification, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier.
    pub id: String,
    /// Primary email address.
    pub email: String,
    /// Display name, when the verifier provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Coarse role label, when the verifier provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    /// Create an identity with the two always-present fields.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            role: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the role label.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// The envelope both cache tiers store for one verified identity.
///
/// Scope and fingerprint are embedded in the value as well as the key so
/// that reads can detect key collisions and foreign data in a shared
/// store. An entry is valid iff it is not expired AND [`matches`] holds
/// for the lookup's scope and fingerprint; anything else is a miss.
///
/// [`matches`]: CachedIdentity::matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIdentity {
    /// The verified identity itself.
    pub user: Identity,
    /// Application/tenant this identity was verified for.
    pub app_scope: String,
    /// Fingerprint of the credential that produced this identity.
    pub token_fingerprint: String,
    /// Absolute instant after which the entry is logically dead,
    /// independent of any store-side TTL.
    pub expires_at: OffsetDateTime,
    /// Insertion time, kept for cache-age diagnostics only.
    pub created_at: OffsetDateTime,
}

impl CachedIdentity {
    /// Build an envelope expiring `ttl` from now.
    #[must_use]
    pub fn new(
        user: Identity,
        app_scope: impl Into<String>,
        token_fingerprint: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            user,
            app_scope: app_scope.into(),
            token_fingerprint: token_fingerprint.into(),
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// Whether the entry is logically dead at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Whether the stored scope and fingerprint match a lookup's computed
    /// values. A `false` here on read means the key collided or the store
    /// holds foreign data; either way the entry must not be served.
    #[must_use]
    pub fn matches(&self, app_scope: &str, token_fingerprint: &str) -> bool {
        self.app_scope == app_scope && self.token_fingerprint == token_fingerprint
    }

    /// Age of the entry at `now`, for diagnostics.
    #[must_use]
    pub fn age(&self, now: OffsetDateTime) -> time::Duration {
        now - self.created_at
    }
}
