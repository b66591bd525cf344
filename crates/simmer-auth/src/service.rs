//! Authentication orchestration across both cache tiers and the verifier
//!
//! [`AuthCacheService`] is the one entry point request handling code talks
//! to. It derives a cache key from the raw credential, probes the local
//! tier, then the distributed tier, and only on a full miss pays the
//! remote [`TokenVerifier`] round-trip. Verified identities are written
//! back to both tiers; a distributed hit is promoted into the local tier
//! for the entry's remaining lifetime.
//!
//! Cache failures on this path are never surfaced. Any tier that cannot
//! answer is treated as a miss, so the worst case degrades to "verify
//! every request," not to a refused or falsely trusted one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::claims::unverified_subject;
use crate::config::AuthCacheConfig;
use crate::distributed::DistributedIdentityCache;
use crate::error::AuthResult;
use crate::identity::Identity;
use crate::local::LocalIdentityCache;
use crate::metrics;

// ============================================================================
// Verifier Collaborator
// ============================================================================

/// Authoritative credential verification, typically a remote service.
///
/// Called only when neither cache tier can answer. Implementations decide
/// transport and protocol; the cache layer only needs the proven identity
/// or an error.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` for `app_scope` and return the proven identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Verification`](crate::error::AuthError) when
    /// the credential is rejected, and whatever transport-level error the
    /// implementation maps for an unreachable verifier. Errors from here
    /// are surfaced to the caller unchanged and never cached.
    async fn verify(&self, app_scope: &str, token: &str) -> AuthResult<Identity>;
}

// ============================================================================
// Service
// ============================================================================

/// Two-tier cached authentication in front of a [`TokenVerifier`].
pub struct AuthCacheService {
    app_scope: String,
    identity_ttl: Duration,
    local: Arc<LocalIdentityCache>,
    distributed: Arc<DistributedIdentityCache>,
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthCacheService {
    /// Wire a service from configuration and its collaborators.
    #[must_use]
    pub fn new(
        config: &AuthCacheConfig,
        local: Arc<LocalIdentityCache>,
        distributed: Arc<DistributedIdentityCache>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            app_scope: config.app_scope.clone(),
            identity_ttl: config.identity_ttl,
            local,
            distributed,
            verifier,
        }
    }

    /// Application scope every cache key and verification is bound to.
    #[must_use]
    pub fn app_scope(&self) -> &str {
        &self.app_scope
    }

    /// Resolve a credential to a verified identity.
    ///
    /// Lookup order:
    ///
    /// 1. Extract an unverified subject from the token payload; without
    ///    one no cache key exists and the caches are skipped entirely.
    /// 2. Probe the local tier, then the distributed tier. A distributed
    ///    hit is promoted into the local tier for its remaining lifetime,
    ///    so the local copy never outlives the shared one.
    /// 3. On a full miss, call the verifier and cache its identity in
    ///    both tiers under the verified subject id.
    ///
    /// # Errors
    ///
    /// Only verifier errors propagate, unchanged. Cache tier failures are
    /// logged inside the tiers and treated as misses.
    pub async fn authenticate(&self, token: &str) -> AuthResult<Arc<Identity>> {
        if let Some(subject) = unverified_subject(token) {
            if let Some(user) = self.local.get(&self.app_scope, &subject, token) {
                tracing::debug!(subject_id = %subject, "Authenticated from local cache");
                return Ok(user);
            }

            if let Some(entry) = self.distributed.get(&self.app_scope, &subject, token).await {
                let remaining: Duration = (entry.expires_at - OffsetDateTime::now_utc())
                    .try_into()
                    .unwrap_or(Duration::ZERO);
                if !remaining.is_zero() {
                    self.local
                        .put(&self.app_scope, entry.user.clone(), token, remaining);
                }
                tracing::debug!(subject_id = %subject, "Authenticated from distributed cache");
                return Ok(Arc::new(entry.user));
            }
        } else {
            tracing::debug!("Credential payload not parseable, skipping cache lookup");
        }

        let user = match self.verifier.verify(&self.app_scope, token).await {
            Ok(user) => {
                metrics::record_verification("success");
                user
            }
            Err(e) => {
                metrics::record_verification("failure");
                return Err(e);
            }
        };

        // Both writes are best-effort; the tiers log their own failures.
        self.local
            .put(&self.app_scope, user.clone(), token, self.identity_ttl);
        self.distributed
            .put(&self.app_scope, user.clone(), token, self.identity_ttl)
            .await;

        tracing::debug!(subject_id = %user.id, "Authenticated via verifier and cached");
        Ok(Arc::new(user))
    }

    /// Drop every cached identity for one subject across both tiers,
    /// regardless of which credential produced it. Logout and credential
    /// rotation path.
    ///
    /// Returns `true` when every configured tier completed the
    /// invalidation; a disabled distributed tier does not count against
    /// success.
    pub async fn invalidate_user(&self, subject_id: &str) -> bool {
        let local_removed = self.local.invalidate_subject(&self.app_scope, subject_id);
        let distributed_ok = self
            .distributed
            .invalidate_subject(&self.app_scope, subject_id)
            .await;

        tracing::info!(
            subject_id = %subject_id,
            local_removed,
            distributed_ok,
            "Invalidated cached identities for subject"
        );

        !self.distributed.is_enabled() || distributed_ok
    }

    /// Release the distributed tier's store connections. Idempotent.
    pub async fn close(&self) {
        self.distributed.close().await;
    }
}

impl std::fmt::Debug for AuthCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCacheService")
            .field("app_scope", &self.app_scope)
            .field("identity_ttl", &self.identity_ttl)
            .field("distributed_enabled", &self.distributed.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use crate::error::AuthError;
    use crate::identity::CachedIdentity;
    use crate::key::{identity_key, token_fingerprint};
    use crate::store::testing::{FailingStore, MemoryStore};

    /// Verifier double that mints an identity from the token's subject
    /// claim, or a fixed fallback id for opaque tokens.
    struct MockVerifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockVerifier {
        fn accepting() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenVerifier for MockVerifier {
        async fn verify(&self, _app_scope: &str, token: &str) -> AuthResult<Identity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::verification("verifier rejected the credential"));
            }
            let id = unverified_subject(token).unwrap_or_else(|| "u-opaque".to_string());
            Ok(Identity::new(id.clone(), format!("{id}@example.com")))
        }
    }

    fn fake_token(subject: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sub": subject }).to_string());
        format!("{header}.{body}.fakesignature")
    }

    fn service_over(
        distributed: DistributedIdentityCache,
        verifier: Arc<MockVerifier>,
    ) -> (AuthCacheService, Arc<LocalIdentityCache>) {
        let config = AuthCacheConfig::default();
        let local = Arc::new(LocalIdentityCache::new(config.local.sweep_threshold));
        let service = AuthCacheService::new(
            &config,
            Arc::clone(&local),
            Arc::new(distributed),
            verifier,
        );
        (service, local)
    }

    #[tokio::test]
    async fn test_first_request_verifies_then_serves_from_cache() {
        let verifier = MockVerifier::accepting();
        let (service, _local) = service_over(
            DistributedIdentityCache::new(Arc::new(MemoryStore::default())),
            Arc::clone(&verifier),
        );
        let token = fake_token("u1");

        let first = service.authenticate(&token).await.expect("verified");
        assert_eq!(first.id, "u1");
        assert_eq!(verifier.calls(), 1);

        let second = service.authenticate(&token).await.expect("cached");
        assert_eq!(second.id, "u1");
        assert_eq!(verifier.calls(), 1, "second request must come from cache");
    }

    #[tokio::test]
    async fn test_distributed_hit_skips_verifier_and_promotes() {
        let store = Arc::new(MemoryStore::default());
        let verifier = MockVerifier::accepting();
        let token = fake_token("u1");

        // Another instance behind the load balancer already cached u1.
        let seeding = DistributedIdentityCache::new(store.clone());
        seeding
            .put(
                "simmer",
                Identity::new("u1", "u1@example.com"),
                &token,
                Duration::from_secs(300),
            )
            .await;

        let (service, local) = service_over(
            DistributedIdentityCache::new(store),
            Arc::clone(&verifier),
        );

        let user = service.authenticate(&token).await.expect("distributed hit");
        assert_eq!(user.id, "u1");
        assert_eq!(verifier.calls(), 0);
        assert!(
            local.get("simmer", "u1", &token).is_some(),
            "distributed hit must be promoted into the local tier"
        );
    }

    #[tokio::test]
    async fn test_verifier_error_surfaces_unchanged_and_is_not_cached() {
        let verifier = MockVerifier::rejecting();
        let (service, local) = service_over(
            DistributedIdentityCache::new(Arc::new(MemoryStore::default())),
            Arc::clone(&verifier),
        );
        let token = fake_token("u1");

        let err = service.authenticate(&token).await.expect_err("rejected");
        assert!(matches!(err, AuthError::Verification { .. }));
        assert!(local.is_empty());

        // A rejection is never cached; the next attempt verifies again.
        let _ = service.authenticate(&token).await;
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_opaque_token_verifies_every_time_but_still_caches() {
        let verifier = MockVerifier::accepting();
        let (service, local) = service_over(
            DistributedIdentityCache::new(Arc::new(MemoryStore::default())),
            Arc::clone(&verifier),
        );

        let user = service.authenticate("not-a-jwt").await.expect("verified");
        assert_eq!(user.id, "u-opaque");
        assert_eq!(verifier.calls(), 1);

        // The identity was cached under the verified subject id even
        // though no subject could be extracted up front.
        assert!(local.get("simmer", "u-opaque", "not-a-jwt").is_some());

        // Without an extractable subject there is no cache key to probe,
        // so the same opaque credential verifies again.
        let _ = service.authenticate("not-a-jwt").await;
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_verifier_with_local_tier_intact() {
        let verifier = MockVerifier::accepting();
        let (service, _local) = service_over(
            DistributedIdentityCache::new(Arc::new(FailingStore::default())),
            Arc::clone(&verifier),
        );
        let token = fake_token("u1");

        let user = service.authenticate(&token).await.expect("verified");
        assert_eq!(user.id, "u1");
        assert_eq!(verifier.calls(), 1);

        // The distributed tier is down, but the local tier still answers.
        let _ = service.authenticate(&token).await.expect("local hit");
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_user_clears_both_tiers() {
        let store = Arc::new(MemoryStore::default());
        let verifier = MockVerifier::accepting();
        let (service, local) =
            service_over(DistributedIdentityCache::new(store), Arc::clone(&verifier));
        let token = fake_token("u1");

        service.authenticate(&token).await.expect("verified");
        assert_eq!(verifier.calls(), 1);

        assert!(service.invalidate_user("u1").await);
        assert!(local.is_empty());

        service.authenticate(&token).await.expect("re-verified");
        assert_eq!(verifier.calls(), 2, "invalidation must force re-verification");
    }

    #[tokio::test]
    async fn test_invalidate_with_disabled_distributed_reports_success() {
        let verifier = MockVerifier::accepting();
        let (service, local) =
            service_over(DistributedIdentityCache::disabled(), Arc::clone(&verifier));
        let token = fake_token("u1");

        service.authenticate(&token).await.expect("verified");
        assert!(!local.is_empty());

        assert!(
            service.invalidate_user("u1").await,
            "only configured tiers count against success"
        );
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_promotion_carries_remaining_lifetime_not_full_ttl() {
        let store = Arc::new(MemoryStore::default());
        let verifier = MockVerifier::accepting();
        let token = fake_token("u1");

        // Plant a distributed entry with only ~50ms of life left.
        let entry = CachedIdentity::new(
            Identity::new("u1", "u1@example.com"),
            "simmer",
            token_fingerprint(&token),
            Duration::from_millis(50),
        );
        let key = identity_key("simmer", "u1", &token_fingerprint(&token));
        store.insert_raw(&key, &serde_json::to_vec(&entry).unwrap());

        let (service, local) = service_over(
            DistributedIdentityCache::new(store),
            Arc::clone(&verifier),
        );

        service.authenticate(&token).await.expect("distributed hit");
        assert_eq!(verifier.calls(), 0);
        assert!(local.get("simmer", "u1", &token).is_some());

        // Past the original expiry the promoted copy must be gone too;
        // had promotion used the configured 300s TTL it would still hit.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(local.get("simmer", "u1", &token).is_none());
    }
}
