//! Redis key-value store backend for simmer-auth
//!
//! Implements [`KeyValueStore`] over a `deadpool-redis` pool so the
//! distributed identity cache can be shared across instances. The pool is
//! created without any I/O; physical connections are established lazily
//! on first use, and an unreachable Redis surfaces as per-operation
//! [`AuthError::Store`] values the cache layer absorbs into misses.
//!
//! TTLs are written with `PSETEX` so sub-second durations survive the
//! trip; key scans use cursor-based `SCAN MATCH`, never `KEYS`.
//!
//! # Example
//!
//! ```ignore
//! use simmer_auth::distributed::DistributedIdentityCache;
//! use simmer_auth_redis::connect_store;
//!
//! let distributed = match connect_store(&config.redis) {
//!     Some(store) => DistributedIdentityCache::new(store),
//!     None => DistributedIdentityCache::disabled(),
//! };
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;

use simmer_auth::config::RedisConfig;
use simmer_auth::error::{AuthError, AuthResult};
use simmer_auth::store::KeyValueStore;

// =============================================================================
// Redis Key-Value Store
// =============================================================================

/// [`KeyValueStore`] backed by a shared Redis connection pool.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    pool: Pool,
}

impl RedisKeyValueStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    ///
    /// Builds the pool without connecting; the first operation pays the
    /// connection cost. Pool acquisition, creation, and recycling all use
    /// `timeout_ms` so no operation can hang on a dead Redis.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the URL or pool settings
    /// are rejected. An unreachable Redis is NOT an error here; it shows
    /// up per-operation once the cache starts using the store.
    pub fn connect(config: &RedisConfig) -> AuthResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = Config::from_url(&config.url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                AuthError::configuration(format!("Invalid Redis pool configuration: {e}"))
            })?;

        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> AuthResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AuthError::store(format!("Redis connection unavailable: {e}")))
    }
}

impl std::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyValueStore")
            .field("status", &self.pool.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64)
            .await
            .map_err(|e| AuthError::store(format!("Redis PSETEX failed: {e}")))
    }

    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| AuthError::store(format!("Redis GET failed: {e}")))
    }

    async fn delete(&self, keys: &[String]) -> AuthResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        conn.del::<_, u64>(keys)
            .await
            .map_err(|e| AuthError::store(format!("Redis DEL failed: {e}")))
    }

    async fn keys_matching(&self, pattern: &str) -> AuthResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut iter = conn
            .scan_match::<_, String>(pattern)
            .await
            .map_err(|e| AuthError::store(format!("Redis SCAN failed: {e}")))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn ping(&self) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::store(format!("Redis PING failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        // Draining an already-closed pool is a no-op.
        self.pool.close();
        tracing::debug!("Closed Redis connection pool");
    }
}

// =============================================================================
// Store Factory
// =============================================================================

/// Build the distributed tier's store from configuration, or `None` when
/// the tier should run disabled.
///
/// Never panics and never fails startup: a disabled config is an
/// intentional `None` (info log), an invalid config a `warn` plus `None`.
/// The caller pairs `None` with
/// [`DistributedIdentityCache::disabled`](simmer_auth::distributed::DistributedIdentityCache::disabled).
#[must_use]
pub fn connect_store(config: &RedisConfig) -> Option<Arc<dyn KeyValueStore>> {
    if !config.enabled {
        tracing::info!("Redis disabled, identity cache runs local-only");
        return None;
    }

    match RedisKeyValueStore::connect(config) {
        Ok(store) => {
            tracing::info!(url = %config.url, pool_size = config.pool_size, "Redis identity cache store configured");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to configure Redis store, identity cache runs local-only");
            None
        }
    }
}
