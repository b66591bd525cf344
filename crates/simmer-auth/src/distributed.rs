//! Distributed identity cache (second tier)
//!
//! Same logical contract as the local tier, but asynchronous and backed
//! by a shared [`KeyValueStore`] so verified identities survive process
//! restarts and are visible to every instance behind the load balancer.
//!
//! Expiry is enforced twice: the store's own TTL (set on every write)
//! performs physical deletion, and the envelope's `expires_at` decides
//! liveness on read. The double check defends against clock skew between
//! the store and the application, and against stores that emulate
//! relative TTLs with absolute timestamps. An expired-but-present entry
//! is reported as a miss and left for the store's reaper.
//!
//! FAILURE POLICY: fail-closed on trust. An unreachable, unconfigured,
//! or misbehaving store degrades every operation to its fallback value
//! (`false`/`None`/`false`) with a log line, never to an error and never
//! to invented trust. Losing this tier costs latency (more verifier
//! round-trips), not correctness.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;

use crate::identity::{CachedIdentity, Identity};
use crate::key::{identity_key, subject_pattern, token_fingerprint};
use crate::metrics;
use crate::store::KeyValueStore;

const TIER: &str = "distributed";

/// Shared identity cache over an injected key-value store.
pub struct DistributedIdentityCache {
    store: Option<Arc<dyn KeyValueStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl DistributedIdentityCache {
    /// Create a cache over a connected store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Create a cache with no backing store.
    ///
    /// Every operation short-circuits to its fallback value, so wiring
    /// code can hold a `DistributedIdentityCache` unconditionally and a
    /// deployment without a store just runs local-plus-verifier.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            store: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Whether a backing store is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Cache a verified identity for `ttl`.
    ///
    /// The full envelope (identity plus scope, fingerprint, and
    /// timestamps) is serialized as the stored value and the store's own
    /// TTL is set to the same duration. Returns `false` on any failure;
    /// callers treat that as "not cached" and move on.
    pub async fn put(&self, app_scope: &str, user: Identity, token: &str, ttl: Duration) -> bool {
        let Some(store) = &self.store else {
            tracing::debug!("Distributed cache not configured, skipping write");
            return false;
        };

        let fingerprint = token_fingerprint(token);
        let key = identity_key(app_scope, &user.id, &fingerprint);
        let entry = CachedIdentity::new(user, app_scope, fingerprint, ttl);

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(key = %key, error = %e, "Failed to encode identity for distributed cache");
                return false;
            }
        };

        match store.set_with_ttl(&key, &bytes, ttl).await {
            Ok(()) => {
                tracing::debug!(
                    key = %key,
                    ttl_ms = ttl.as_millis() as u64,
                    "Cached identity in distributed tier"
                );
                true
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Distributed cache write failed");
                false
            }
        }
    }

    /// Look up a cached identity envelope.
    ///
    /// Returns `None` for absent, undecodable, expired, or mismatched
    /// entries and for any store failure. A scope/fingerprint mismatch
    /// means the key collided or a foreign writer shares the store; it
    /// is logged at warn because it is worth monitoring, and served as a
    /// plain miss because it is handled safely.
    pub async fn get(
        &self,
        app_scope: &str,
        subject_id: &str,
        token: &str,
    ) -> Option<CachedIdentity> {
        let Some(store) = &self.store else {
            tracing::debug!("Distributed cache not configured, skipping lookup");
            return None;
        };

        let fingerprint = token_fingerprint(token);
        let key = identity_key(app_scope, subject_id, &fingerprint);

        let bytes = match store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_miss(TIER);
                return None;
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Distributed cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CachedIdentity = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Undecodable distributed cache entry, treating as miss");
                return None;
            }
        };

        if entry.is_expired(OffsetDateTime::now_utc()) {
            // Store-side TTL handles the physical delete.
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(TIER);
            tracing::debug!(key = %key, "Distributed cache entry expired on read");
            return None;
        }

        if !entry.matches(app_scope, &fingerprint) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(TIER);
            tracing::warn!(
                key = %key,
                stored_scope = %entry.app_scope,
                "Distributed cache entry scope/fingerprint mismatch, treating as miss"
            );
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit(TIER);
        Some(entry)
    }

    /// Delete every entry for one subject, regardless of which credential
    /// produced it, in a single pattern-match-then-delete pass.
    ///
    /// Returns `true` when the store confirmed the pass (including "there
    /// was nothing to delete"), `false` on any failure or when no store
    /// is configured.
    pub async fn invalidate_subject(&self, app_scope: &str, subject_id: &str) -> bool {
        let Some(store) = &self.store else {
            tracing::debug!("Distributed cache not configured, skipping invalidation");
            return false;
        };

        let pattern = subject_pattern(app_scope, subject_id);
        let keys = match store.keys_matching(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pattern = %pattern, error = %e, "Distributed cache key scan failed");
                return false;
            }
        };

        if keys.is_empty() {
            return true;
        }

        match store.delete(&keys).await {
            Ok(removed) => {
                tracing::debug!(pattern = %pattern, removed, "Invalidated distributed cache entries");
                true
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pattern = %pattern, error = %e, "Distributed cache delete failed");
                false
            }
        }
    }

    /// Round-trip health check against the backing store.
    pub async fn is_available(&self) -> bool {
        match &self.store {
            Some(store) => store.ping().await.is_ok(),
            None => false,
        }
    }

    /// Release the backing store's connections. Idempotent; a no-op when
    /// disabled.
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.close().await;
        }
    }

    /// Snapshot of the tier's counters.
    #[must_use]
    pub fn stats(&self) -> DistributedTierStats {
        DistributedTierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DistributedIdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedIdentityCache")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Counter snapshot for the distributed tier.
///
/// Entry counts live in the store itself, so unlike the local tier this
/// snapshot tracks absorbed store failures instead of a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributedTierStats {
    /// Lookups answered from this tier.
    pub hits: u64,
    /// Clean misses (absent, expired, or mismatched entries).
    pub misses: u64,
    /// Store or encoding failures absorbed into fallback values.
    pub errors: u64,
}
