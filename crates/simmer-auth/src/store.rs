//! Distributed key-value store collaborator
//!
//! The distributed cache tier talks to its backing store exclusively
//! through this trait, injected as an `Arc<dyn KeyValueStore>`. The
//! production implementation lives in the `simmer-auth-redis` crate;
//! tests substitute in-memory and fault-injecting doubles.
//!
//! Every operation is fallible and callers never assume availability:
//! the cache tier above converts any error into its documented fallback
//! value instead of propagating it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthResult;

/// Abstract TTL-capable key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// The store's own expiry is authoritative for physical deletion;
    /// callers layer their own liveness checks on top.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable or rejects the
    /// write.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> AuthResult<()>;

    /// Fetch the value under `key`, `None` when absent or already
    /// expired store-side.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>>;

    /// Delete every listed key in one operation. Returns how many
    /// existed. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    async fn delete(&self, keys: &[String]) -> AuthResult<u64>;

    /// List the keys matching a glob `pattern` (for example
    /// `auth:app1:u1:*`).
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    async fn keys_matching(&self, pattern: &str) -> AuthResult<Vec<String>>;

    /// Round-trip health check.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    async fn ping(&self) -> AuthResult<()>;

    /// Release the store's connections. Idempotent; a no-op when no
    /// connection was ever established. Intended for graceful shutdown,
    /// not per-request lifecycle.
    async fn close(&self);
}
