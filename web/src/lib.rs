//! Axum integration for the Arena platform.
//!
//! The HTTP shell around the services in `arena` (the platform crate):
//!
//! - [`AppError`] / [`ApiResponse`]: the `{ success, data | error, code }`
//!   envelope every endpoint answers with
//! - [`extractors`]: correlation id, client IP and bearer token
//! - [`middleware`]: correlation id propagation and request spans
//! - [`rate_limit`]: per-IP fixed-window throttling for write endpoints
//! - [`handlers::health`]: liveness and readiness probes
//!
//! # Request Flow
//!
//! 1. **Correlation layer** assigns an id and opens the `http_request` span
//! 2. **Rate limiter** (write routes only) counts the client IP
//! 3. **Extractors** resolve the session and decode the body
//! 4. **Service call** returns `Result<T, ArenaError>`
//! 5. **Envelope**: `ApiResponse` on success, `AppError` otherwise
//!
//! # Example
//!
//! ```ignore
//! use arena_web::{ApiResponse, AppError, correlation_id_layer};
//! use axum::{Router, routing::get};
//!
//! async fn cart(State(state): State<AppState>, user: SessionUser)
//!     -> Result<ApiResponse<CartView>, AppError>
//! {
//!     Ok(ApiResponse::ok(state.carts.view(user.id()).await?))
//! }
//!
//! let app = Router::new()
//!     .route("/api/cart", get(cart))
//!     .layer(correlation_id_layer())
//!     .with_state(app_state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod response;

pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, CorrelationId, JsonBody, QueryParams};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use rate_limit::{RateLimiter, rate_limit};
pub use response::ApiResponse;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
