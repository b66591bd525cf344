//! # simmer-auth
//!
//! Authentication caching and request rate limiting for the Simmer backend.
//!
//! This crate provides:
//! - A two-tier cache of verified identities so protected requests avoid a
//!   remote verification round-trip
//! - A deterministic, non-cryptographic token fingerprint for scoping cache
//!   keys without persisting raw credentials
//! - Best-effort subject extraction from unverified credential payloads
//! - A fixed-window request rate limiter with standard response headers
//! - Axum middleware wiring both in front of protected routes
//!
//! ## Architecture
//!
//! ```text
//! request → rate limiter → local tier (DashMap) → distributed tier (Redis)
//!               ↓               <1µs, per-process     ~ms, shared
//!          429 on block                ↓ miss               ↓ miss
//!                                      └──────→ TokenVerifier (remote)
//! ```
//!
//! A verified identity is written to both tiers; a distributed hit is
//! promoted into the local tier for its remaining lifetime. Any cache
//! failure behaves as a miss, so losing a tier costs latency, never
//! correctness: the system degrades to verifying every request, not to
//! trusting or refusing anyone.
//!
//! ## Modules
//!
//! - [`claims`] - Unverified subject extraction from credential payloads
//! - [`config`] - Cache, Redis, and rate-limit configuration
//! - [`distributed`] - Shared cache tier over a [`store::KeyValueStore`]
//! - [`error`] - Error type and result alias
//! - [`identity`] - Identity records and the cached envelope
//! - [`key`] - Token fingerprint and cache key construction
//! - [`local`] - Process-local cache tier
//! - [`metrics`] - Metric names and recording helpers
//! - [`middleware`] - Axum rate-limit and authentication layers
//! - [`ratelimit`] - Fixed-window request limiter
//! - [`service`] - Orchestration across tiers and the verifier
//! - [`store`] - Key-value store abstraction for the distributed tier

pub mod claims;
pub mod config;
pub mod distributed;
pub mod error;
pub mod identity;
pub mod key;
pub mod local;
pub mod metrics;
pub mod middleware;
pub mod ratelimit;
pub mod service;
pub mod store;

pub use claims::{SUBJECT_CLAIMS, unverified_subject};
pub use config::{AuthCacheConfig, LocalCacheConfig, RateLimitConfig, RedisConfig};
pub use distributed::{DistributedIdentityCache, DistributedTierStats};
pub use error::{AuthError, AuthResult, ErrorCategory};
pub use identity::{CachedIdentity, Identity};
pub use key::{identity_key, subject_pattern, token_fingerprint};
pub use local::{CacheTierStats, LocalIdentityCache};
pub use middleware::{AuthLayerState, rate_limit_middleware, require_auth};
pub use ratelimit::{RateLimitDecision, RateLimitWindow, RateLimiter, UNKNOWN_IDENTIFIER};
pub use service::{AuthCacheService, TokenVerifier};
pub use store::KeyValueStore;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use simmer_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{AuthCacheConfig, LocalCacheConfig, RateLimitConfig, RedisConfig};
    pub use crate::distributed::{DistributedIdentityCache, DistributedTierStats};
    pub use crate::error::{AuthError, AuthResult, ErrorCategory};
    pub use crate::identity::{CachedIdentity, Identity};
    pub use crate::local::{CacheTierStats, LocalIdentityCache};
    pub use crate::middleware::{AuthLayerState, rate_limit_middleware, require_auth};
    pub use crate::ratelimit::{RateLimitDecision, RateLimiter};
    pub use crate::service::{AuthCacheService, TokenVerifier};
    pub use crate::store::KeyValueStore;
}
