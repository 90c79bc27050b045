//! Best-effort rate limiting.
//!
//! Fixed-window counter per client IP in an in-process map. Each server
//! instance counts on its own, so the effective limit behind a load balancer
//! is `instances × max_requests`. It throttles abuse; it is not a
//! correctness mechanism.
//!
//! # Example
//!
//! ```ignore
//! use arena_web::rate_limit::{RateLimiter, rate_limit};
//! use axum::{Router, middleware, routing::post};
//!
//! let limiter = Arc::new(RateLimiter::new(30, Duration::from_secs(60)));
//! let app = Router::new()
//!     .route("/checkout", post(checkout))
//!     .route_layer(middleware::from_fn_with_state(limiter, rate_limit));
//! ```

use crate::error::AppError;
use crate::extractors::ClientIp;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Entries beyond this count trigger a sweep of finished windows.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    /// Allows `max_requests` per `window` per IP.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts a request from `ip` and reports whether it is allowed.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    /// [`check`](Self::check) at an explicit instant.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned map only loses throttling, never requests.
            return true;
        };

        if windows.len() > SWEEP_THRESHOLD {
            let span = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < span);
        }

        let entry = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

/// Axum middleware rejecting over-limit clients with 429.
///
/// # Errors
///
/// Returns [`AppError::too_many_requests`] when the client exhausted its
/// window.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !limiter.check(ip) {
        tracing::warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        metrics::counter!("arena_rate_limited_total").increment(1);
        return Err(AppError::too_many_requests(
            "Too many requests, please try again later",
        ));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::post};
    use tower::ServiceExt;

    #[test]
    fn test_window_allows_then_blocks_then_resets() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        let start = Instant::now();

        assert!(limiter.check_at(ip, start));
        assert!(limiter.check_at(ip, start + Duration::from_secs(1)));
        assert!(!limiter.check_at(ip, start + Duration::from_secs(2)));
        assert!(limiter.check_at(ip, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("198.51.100.1".parse().unwrap(), now));
        assert!(limiter.check_at("198.51.100.2".parse().unwrap(), now));
        assert!(!limiter.check_at("198.51.100.1".parse().unwrap(), now));
    }

    #[tokio::test]
    async fn test_middleware_returns_429_envelope() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = Router::new()
            .route("/flags", post(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit));

        let request = |ip: &str| {
            axum::http::Request::builder()
                .method("POST")
                .uri("/flags")
                .header("X-Forwarded-For", ip)
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request("203.0.113.9")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let limited = app.clone().oneshot(request("203.0.113.9")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = axum::body::to_bytes(limited.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["success"], false);

        let other = app.oneshot(request("203.0.113.10")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }
}
