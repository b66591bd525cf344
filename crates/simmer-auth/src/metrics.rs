//! Metrics emitted by the caching and rate-limiting layer
//!
//! Everything goes through the `metrics` facade: recording is a no-op
//! until the embedding application installs a recorder, so the library
//! never decides how (or whether) metrics are exported.

use metrics::{counter, gauge};

/// Metric name constants.
pub mod names {
    /// Cache hits, labeled by `tier` (`local` / `distributed`).
    pub const AUTH_CACHE_HITS_TOTAL: &str = "auth_cache_hits_total";
    /// Cache misses, labeled by `tier`.
    pub const AUTH_CACHE_MISSES_TOTAL: &str = "auth_cache_misses_total";
    /// Current entry count, labeled by `tier`.
    pub const AUTH_CACHE_ENTRIES: &str = "auth_cache_entries";
    /// Requests blocked by the rate limiter.
    pub const RATE_LIMIT_BLOCKED_TOTAL: &str = "rate_limit_blocked_total";
    /// Calls to the authoritative verifier, labeled by `outcome`.
    pub const TOKEN_VERIFICATIONS_TOTAL: &str = "token_verifications_total";
}

/// Record a cache hit for the given tier.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::AUTH_CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a cache miss for the given tier.
pub fn record_cache_miss(tier: &'static str) {
    counter!(names::AUTH_CACHE_MISSES_TOTAL, "tier" => tier).increment(1);
}

/// Publish the current entry count for a tier.
pub fn set_cache_entries(tier: &'static str, count: usize) {
    gauge!(names::AUTH_CACHE_ENTRIES, "tier" => tier).set(count as f64);
}

/// Record a request blocked by the rate limiter.
pub fn record_rate_limit_block() {
    counter!(names::RATE_LIMIT_BLOCKED_TOTAL).increment(1);
}

/// Record a round-trip to the authoritative verifier.
pub fn record_verification(outcome: &'static str) {
    counter!(names::TOKEN_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}
