//! Cross-cutting request concerns.
//!
//! Request-id tagging, CORS, and the per-user fixed-window rate limiter
//! applied to mutating wager routes before the user lock is taken.

use crate::errors::{EngineError, EngineResult};
use axum::http::HeaderName;
use axum::{extract::Request, middleware::Next, response::Response};
use chrono::Utc;
use dashmap::DashMap;
use tower_http::cors::ExposeHeaders;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// CORS layer with configurable origins; `*` or empty means allow all.
pub fn create_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(
                REQUEST_ID_HEADER,
            )]))
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(
                REQUEST_ID_HEADER,
            )]))
    }
}

/// Tag every request with an id (client-provided or minted) and echo it in
/// the response headers.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Fixed-window limiter: one mutating wager call per user per window.
/// Checked before the user lock so queued-up spam never serializes behind
/// a slow commit.
pub struct RateLimiter {
    window_ms: u64,
    last_action: DashMap<u64, i64>,
}

impl RateLimiter {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_action: DashMap::new(),
        }
    }

    pub fn check(&self, user_id: u64) -> EngineResult<()> {
        if self.window_ms == 0 {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        let mut entry = self.last_action.entry(user_id).or_insert(0);
        let elapsed = now.saturating_sub(*entry);
        if elapsed >= 0 && (elapsed as u64) < self.window_ms {
            return Err(EngineError::RateLimited {
                retry_after_ms: self.window_ms - elapsed as u64,
            });
        }
        *entry = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_inside_window_is_limited() {
        let limiter = RateLimiter::new(60_000);
        limiter.check(1).unwrap();
        let err = limiter.check(1).unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");
        match err {
            EngineError::RateLimited { retry_after_ms } => {
                assert!(retry_after_ms <= 60_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn users_are_limited_independently() {
        let limiter = RateLimiter::new(60_000);
        limiter.check(1).unwrap();
        limiter.check(2).unwrap();
        assert!(limiter.check(1).is_err());
    }

    #[test]
    fn zero_window_disables_limiting() {
        let limiter = RateLimiter::new(0);
        for _ in 0..10 {
            limiter.check(1).unwrap();
        }
    }
}
