//! Fixed-window request rate limiting
//!
//! Counts requests per client identifier in fixed windows: the first
//! request opens a window, every request inside it increments the count,
//! and once the count reaches the limit further requests are refused
//! until the window's original end. A blocked request never extends the
//! window, so the longest possible lockout is one window regardless of
//! continued hammering.
//!
//! Independent of the identity caches: limiting happens before any auth
//! work, purely on the client identifier.
//!
//! FAILURE POLICY: fail-open on availability. When no decision can be
//! computed the caller allows the request. The identity caches make the
//! opposite choice; see [`crate::distributed`].

use std::time::Duration;

use axum::http::HeaderName;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::config::RateLimitConfig;
use crate::metrics;

/// Identifier used when a request carries no usable client address.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// `X-RateLimit-Limit`: requests allowed per window.
pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining`: requests left in the current window.
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset`: window end as unix seconds.
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Per-identifier counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Requests seen in the current window.
    pub count: u32,
    /// Absolute instant the window rolls over.
    pub reset_at: OffsetDateTime,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Absolute instant the current window rolls over.
    pub reset_at: OffsetDateTime,
}

impl RateLimitDecision {
    /// Render the decision as the `X-RateLimit-*` header triple.
    ///
    /// Produced for every outcome, allowed or blocked, so middleware can
    /// attach it to all responses uniformly.
    #[must_use]
    pub fn headers(&self) -> [(HeaderName, String); 3] {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_at.unix_timestamp().to_string()),
        ]
    }
}

/// Fixed-window rate limiter over a concurrent map.
///
/// Explicitly constructed and injectable; tests create isolated
/// instances with tight windows. Expired windows are removed lazily
/// (replaced on the next check for that identifier) and swept in bulk
/// once the map crosses its size threshold.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    limit: u32,
    window: Duration,
    sweep_threshold: usize,
}

impl RateLimiter {
    /// Create a limiter from its configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            limit: config.max_requests,
            window: config.window,
            sweep_threshold: config.sweep_threshold,
        }
    }

    /// Count one request for `identifier` and decide whether it may
    /// proceed. Total: always returns a decision, never an error.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        if self.windows.len() > self.sweep_threshold {
            self.sweep_expired();
        }

        let now = OffsetDateTime::now_utc();
        match self.windows.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if now >= window.reset_at {
                    // Rolled over: replace, never increment across windows.
                    *window = RateLimitWindow {
                        count: 1,
                        reset_at: now + self.window,
                    };
                    self.decision(true, self.limit.saturating_sub(1), window.reset_at)
                } else if window.count >= self.limit {
                    metrics::record_rate_limit_block();
                    tracing::debug!(
                        identifier = %identifier,
                        reset_at = %window.reset_at,
                        "Rate limit exceeded"
                    );
                    self.decision(false, 0, window.reset_at)
                } else {
                    window.count += 1;
                    self.decision(true, self.limit.saturating_sub(window.count), window.reset_at)
                }
            }
            Entry::Vacant(vacant) => {
                let reset_at = now + self.window;
                vacant.insert(RateLimitWindow { count: 1, reset_at });
                self.decision(true, self.limit.saturating_sub(1), reset_at)
            }
        }
    }

    fn decision(&self, allowed: bool, remaining: u32, reset_at: OffsetDateTime) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            limit: self.limit,
            remaining,
            reset_at,
        }
    }

    /// Remove every rolled-over window. Returns how many were removed.
    ///
    /// Runs automatically from [`check`](Self::check) past the size
    /// threshold; exposed for operators and tests.
    pub fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.windows.len();
        self.windows.retain(|_, window| now < window.reset_at);
        let removed = before.saturating_sub(self.windows.len());

        if removed > 0 {
            tracing::debug!(removed, tracked = self.windows.len(), "Swept expired rate-limit windows");
        }
        removed
    }

    /// Forget all tracked identifiers. Test and operator hook.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Identifiers currently tracked, including not-yet-swept expired
    /// windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no identifiers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
