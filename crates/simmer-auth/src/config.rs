//! Configuration for the authentication caching layer
//!
//! All settings deserialize from the embedding application's config file
//! with sensible defaults, so an empty section yields a working layer
//! (local tier only, distributed tier disabled). Durations accept
//! humantime strings (`"5m"`, `"90s"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Top-level configuration for the caching and rate-limiting layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    /// Application/tenant identifier baked into every cache key.
    pub app_scope: String,

    /// How long a verified identity stays cached in both tiers.
    #[serde(with = "humantime_serde")]
    pub identity_ttl: Duration,

    /// Process-local tier settings.
    pub local: LocalCacheConfig,

    /// Distributed tier settings.
    pub redis: RedisConfig,

    /// Request rate limiting settings.
    pub rate_limit: RateLimitConfig,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            app_scope: "simmer".to_string(),
            identity_ttl: Duration::from_secs(300),
            local: LocalCacheConfig::default(),
            redis: RedisConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AuthCacheConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the offending field.
    pub fn validate(&self) -> AuthResult<()> {
        if self.app_scope.trim().is_empty() {
            return Err(AuthError::configuration("app_scope must not be empty"));
        }
        if self.identity_ttl.is_zero() {
            return Err(AuthError::configuration("identity_ttl must be positive"));
        }
        if self.local.sweep_threshold == 0 {
            return Err(AuthError::configuration(
                "local.sweep_threshold must be positive",
            ));
        }
        self.redis.validate()?;
        self.rate_limit.validate()
    }
}

/// Process-local cache tier settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Entry count above which the next write sweeps expired entries.
    pub sweep_threshold: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            sweep_threshold: 1000,
        }
    }
}

/// Connection settings for the distributed cache tier.
///
/// Disabled by default: the layer degrades gracefully to the local tier
/// plus the authoritative verifier when no store is configured.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Whether the distributed tier is enabled.
    pub enabled: bool,
    /// Connection URL.
    pub url: String,
    /// Maximum pool size.
    pub pool_size: usize,
    /// Per-operation timeout in milliseconds, applied to connection
    /// acquisition and recycling.
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    fn validate(&self) -> AuthResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.url.trim().is_empty() {
            return Err(AuthError::configuration(
                "redis.url must not be empty when redis.enabled",
            ));
        }
        if self.pool_size == 0 {
            return Err(AuthError::configuration("redis.pool_size must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(AuthError::configuration("redis.timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Fixed-window rate limiting settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Requests allowed per identifier per window.
    pub max_requests: u32,
    /// Tracked-identifier count above which the next check sweeps
    /// expired windows.
    pub sweep_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
            sweep_threshold: 1000,
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> AuthResult<()> {
        if self.window.is_zero() {
            return Err(AuthError::configuration(
                "rate_limit.window must be positive",
            ));
        }
        if self.max_requests == 0 {
            return Err(AuthError::configuration(
                "rate_limit.max_requests must be positive",
            ));
        }
        if self.sweep_threshold == 0 {
            return Err(AuthError::configuration(
                "rate_limit.sweep_threshold must be positive",
            ));
        }
        Ok(())
    }
}
