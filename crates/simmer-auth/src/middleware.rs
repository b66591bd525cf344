//! Axum middleware wiring the rate limiter and the auth cache service
//!
//! Two layers, applied so the rate limiter runs outermost:
//!
//! ```ignore
//! Router::new()
//!     .route("/recipes", get(list_recipes))
//!     .layer(middleware::from_fn_with_state(state.clone(), require_auth))
//!     .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
//! ```
//!
//! The rate limiter attaches its header triple to every response it sees,
//! including 401s and 429s, so clients can always read their budget. A
//! blocked request never reaches authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::ratelimit::{RateLimitDecision, RateLimiter, UNKNOWN_IDENTIFIER};
use crate::service::AuthCacheService;

// ============================================================================
// Shared State
// ============================================================================

/// Handles both middleware functions need; cheap to clone for
/// `from_fn_with_state`.
#[derive(Clone)]
pub struct AuthLayerState {
    /// Two-tier cached authentication.
    pub service: Arc<AuthCacheService>,
    /// Fixed-window request limiter.
    pub limiter: Arc<RateLimiter>,
}

impl AuthLayerState {
    /// Bundle the service and limiter handles.
    #[must_use]
    pub fn new(service: Arc<AuthCacheService>, limiter: Arc<RateLimiter>) -> Self {
        Self { service, limiter }
    }
}

// ============================================================================
// Rate Limiting Middleware
// ============================================================================

/// Gate requests through the fixed-window limiter before any auth work.
///
/// The client identifier is the first `X-Forwarded-For` entry, else
/// `X-Real-IP`, else a shared `"unknown"` bucket. Blocked requests get a
/// 429 JSON body; every response, blocked or not, carries the
/// `X-RateLimit-*` headers for the window that judged it.
pub async fn rate_limit_middleware(
    State(state): State<AuthLayerState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identifier = client_identifier(req.headers());
    let decision = state.limiter.check(&identifier);

    if !decision.allowed {
        let mut response = too_many_requests_response();
        apply_rate_limit_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(&mut response, &decision);
    response
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Require a verifiable Bearer credential and inject the identity.
///
/// On success the verified `Arc<Identity>` is stored in request
/// extensions for handlers to extract. Every failure (missing header,
/// malformed scheme, rejected credential) yields the same uniform 401 so
/// the response does not leak which check failed; the specific cause is
/// logged at `debug`.
pub async fn require_auth(
    State(state): State<AuthLayerState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Some(token) => token,
        None => {
            tracing::debug!(path = %req.uri().path(), "Missing or malformed Authorization header");
            return unauthorized_response("Missing bearer token");
        }
    };

    match state.service.authenticate(token).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Authentication failed");
            unauthorized_response("Invalid or expired credential")
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Pull a non-empty Bearer credential out of the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Best-effort client identifier for rate limiting.
fn client_identifier(headers: &HeaderMap) -> String {
    // Behind a proxy the first X-Forwarded-For entry is the real client.
    if let Some(forwarded) = header_str(headers, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    UNKNOWN_IDENTIFIER.to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Attach the limit/remaining/reset triple to a response.
fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = json!({
        "error": "unauthorized",
        "message": message,
    });

    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(body),
    )
        .into_response()
}

fn too_many_requests_response() -> Response {
    let body = json!({
        "error": "rate_limited",
        "message": "Too many requests, slow down",
    });

    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}
