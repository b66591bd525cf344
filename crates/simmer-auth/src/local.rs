//! Process-local identity cache (first tier)
//!
//! Synchronous, in-memory, per-process. This tier is a best-effort
//! accelerator in front of the distributed tier and the authoritative
//! verifier; it has no external dependencies and no background tasks.
//!
//! Expiry is enforced two independent ways:
//!
//! - **Lazy** (read path): an expired entry found by [`get`] is removed
//!   on the spot and reported as a miss.
//! - **Sweep** (write path): once the map grows past its configured
//!   threshold, the next [`put`] synchronously removes every expired
//!   entry before inserting. This bounds growth in a long-lived process
//!   without a scheduler.
//!
//! FAILURE POLICY: fail-closed on trust. Anything unexpected is absorbed
//! at the public boundary and reported as "not cached" (`false`/`None`),
//! forcing callers back to the authoritative check. This tier must never
//! invent trust and never propagate an error.
//!
//! [`get`]: LocalIdentityCache::get
//! [`put`]: LocalIdentityCache::put

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;

use crate::identity::Identity;
use crate::key::{identity_key, token_fingerprint};
use crate::metrics;

const TIER: &str = "local";

/// One cached identity plus the fields needed to re-validate it on read.
#[derive(Debug, Clone)]
struct CachedEntry {
    user: Arc<Identity>,
    app_scope: String,
    token_fingerprint: String,
    expires_at: OffsetDateTime,
}

impl CachedEntry {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Process-local identity cache backed by a concurrent map.
///
/// Explicitly constructed and injectable; production wiring holds one
/// instance per process, tests create isolated instances freely.
#[derive(Debug)]
pub struct LocalIdentityCache {
    entries: DashMap<String, CachedEntry>,
    sweep_threshold: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalIdentityCache {
    /// Create a cache that sweeps expired entries on the next write once
    /// it holds more than `sweep_threshold` entries.
    #[must_use]
    pub fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: DashMap::new(),
            sweep_threshold,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache a verified identity for `ttl`.
    ///
    /// The key is derived from `app_scope`, `user.id`, and the
    /// credential's fingerprint. Returns `true` when the entry was
    /// stored; this tier has no external failure modes, so the return
    /// value exists to keep both tiers callable through one contract and
    /// callers must still treat `false` as "not cached" rather than
    /// fatal.
    pub fn put(&self, app_scope: &str, user: Identity, token: &str, ttl: Duration) -> bool {
        if self.entries.len() > self.sweep_threshold {
            self.sweep_expired();
        }

        let fingerprint = token_fingerprint(token);
        let key = identity_key(app_scope, &user.id, &fingerprint);
        let entry = CachedEntry {
            user: Arc::new(user),
            app_scope: app_scope.to_string(),
            token_fingerprint: fingerprint,
            expires_at: OffsetDateTime::now_utc() + ttl,
        };

        self.entries.insert(key.clone(), entry);
        metrics::set_cache_entries(TIER, self.entries.len());
        tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cached identity in local tier");
        true
    }

    /// Look up a cached identity.
    ///
    /// Returns `None` for absent, expired (removed on the spot), or
    /// mismatched entries. A scope/fingerprint mismatch can only occur
    /// when distinct lookups collide on one key (for example separator
    /// characters inside a forged subject claim); it is logged and
    /// treated as a miss.
    #[must_use]
    pub fn get(&self, app_scope: &str, subject_id: &str, token: &str) -> Option<Arc<Identity>> {
        let fingerprint = token_fingerprint(token);
        let key = identity_key(app_scope, subject_id, &fingerprint);

        let Some(entry) = self.entries.get(&key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(TIER);
            return None;
        };

        if entry.is_expired(OffsetDateTime::now_utc()) {
            // Release the shard guard before mutating the map.
            drop(entry);
            self.entries.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(TIER);
            tracing::debug!(key = %key, "Local cache entry expired on read");
            return None;
        }

        if !(entry.app_scope == app_scope && entry.token_fingerprint == fingerprint) {
            drop(entry);
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(TIER);
            tracing::warn!(
                key = %key,
                "Local cache entry scope/fingerprint mismatch, treating as miss"
            );
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit(TIER);
        Some(Arc::clone(&entry.user))
    }

    /// Remove every expired entry. Returns how many were removed.
    ///
    /// Runs automatically from [`put`](Self::put) past the size
    /// threshold; exposed so operators and tests can trigger it directly.
    pub fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::set_cache_entries(TIER, self.entries.len());
            tracing::debug!(removed, remaining = self.entries.len(), "Swept expired local cache entries");
        }
        removed
    }

    /// Remove every entry for one subject, regardless of which credential
    /// produced it. Returns how many were removed. Used on logout and
    /// credential rotation.
    pub fn invalidate_subject(&self, app_scope: &str, subject_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.app_scope == app_scope && entry.user.id == subject_id));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            metrics::set_cache_entries(TIER, self.entries.len());
            tracing::debug!(
                app_scope = %app_scope,
                subject_id = %subject_id,
                removed,
                "Invalidated local cache entries for subject"
            );
        }
        removed
    }

    /// Empty the cache unconditionally. Test and operator hook.
    pub fn clear(&self) {
        self.entries.clear();
        metrics::set_cache_entries(TIER, 0);
        tracing::debug!("Cleared local identity cache");
    }

    /// Number of entries currently held, including not-yet-swept expired
    /// ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the tier's counters.
    #[must_use]
    pub fn stats(&self) -> CacheTierStats {
        CacheTierStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot for one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTierStats {
    /// Entries currently held.
    pub size: usize,
    /// Lookups answered from this tier.
    pub hits: u64,
    /// Lookups this tier could not answer.
    pub misses: u64,
    /// Entries removed by expiry (lazy or sweep).
    pub evictions: u64,
}

impl CacheTierStats {
    /// Hit rate in `[0.0, 1.0]`; zero when nothing was looked up yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity(id: &str) -> Identity {
        Identity::new(id, format!("{id}@example.com"))
    }

    #[test]
    fn test_put_and_get_round_trip() {
        let cache = LocalIdentityCache::new(1000);
        assert!(cache.put(
            "app1",
            test_identity("u1").with_name("Uno"),
            "tok",
            Duration::from_secs(300),
        ));

        let found = cache.get("app1", "u1", "tok").expect("cached identity");
        assert_eq!(found.id, "u1");
        assert_eq!(found.email, "u1@example.com");
        assert_eq!(found.name.as_deref(), Some("Uno"));
    }

    #[test]
    fn test_miss_for_unknown_subject() {
        let cache = LocalIdentityCache::new(1000);
        assert!(cache.get("app1", "nobody", "tok").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_different_token_misses() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "tok-a", Duration::from_secs(300));
        assert!(cache.get("app1", "u1", "tok-b").is_none());
        assert!(cache.get("app1", "u1", "tok-a").is_some());
    }

    #[test]
    fn test_scope_isolation() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "tok", Duration::from_secs(300));
        assert!(cache.get("app2", "u1", "tok").is_none());
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "tok", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));

        assert!(cache.get("app1", "u1", "tok").is_none());
        assert_eq!(cache.len(), 0, "lazy expiry must remove the entry");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "t1", Duration::from_millis(1));
        cache.put("app1", test_identity("u2"), "t2", Duration::from_millis(1));
        cache.put("app1", test_identity("u3"), "t3", Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("app1", "u3", "t3").is_some());
    }

    #[test]
    fn test_write_past_threshold_triggers_sweep() {
        let cache = LocalIdentityCache::new(5);
        for i in 0..6 {
            cache.put(
                "app1",
                test_identity(&format!("u{i}")),
                &format!("t{i}"),
                Duration::from_millis(1),
            );
        }
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.len(), 6);

        // len > threshold, so this write sweeps the six dead entries first.
        cache.put("app1", test_identity("fresh"), "tf", Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("app1", "fresh", "tf").is_some());
    }

    #[test]
    fn test_invalidate_subject_covers_all_fingerprints() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "tok-a", Duration::from_secs(300));
        cache.put("app1", test_identity("u1"), "tok-b", Duration::from_secs(300));
        cache.put("app1", test_identity("u2"), "tok-c", Duration::from_secs(300));

        assert_eq!(cache.invalidate_subject("app1", "u1"), 2);
        assert!(cache.get("app1", "u1", "tok-a").is_none());
        assert!(cache.get("app1", "u1", "tok-b").is_none());
        assert!(cache.get("app1", "u2", "tok-c").is_some());
    }

    #[test]
    fn test_colliding_key_mismatch_is_a_miss() {
        let cache = LocalIdentityCache::new(1000);
        // "a" + "b:c" and "a:b" + "c" build the same key string; the
        // stored scope check must reject the second lookup.
        cache.put("a", test_identity("b:c"), "tok", Duration::from_secs(300));
        assert!(cache.get("a:b", "c", "tok").is_none());
        assert!(cache.get("a", "b:c", "tok").is_some());
    }

    #[test]
    fn test_clear_empties_unconditionally() {
        let cache = LocalIdentityCache::new(1000);
        cache.put("app1", test_identity("u1"), "tok", Duration::from_secs(300));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let cache = LocalIdentityCache::new(1000);
        assert_eq!(cache.stats().hit_rate(), 0.0);

        cache.put("app1", test_identity("u1"), "tok", Duration::from_secs(300));
        let _ = cache.get("app1", "u1", "tok");
        let _ = cache.get("app1", "u9", "tok");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
