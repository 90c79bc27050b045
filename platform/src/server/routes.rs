//! Router configuration.

use super::state::AppState;
use crate::api::{cart, checkout, flags, payments};
use crate::live::live_feed;
use arena_web::handlers::{health_check, readiness};
use arena_web::{correlation_id_layer, rate_limit};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete router.
///
/// | Method | Path | Access |
/// |---|---|---|
/// | GET | `/health`, `/ready` | public |
/// | GET | `/cart` | session |
/// | POST | `/cart/add` | session, rate limited |
/// | DELETE | `/cart/remove?itemId=` | session |
/// | POST | `/checkout` | session, rate limited |
/// | POST | `/payments/notify` | gateway signature |
/// | GET | `/my-registrations` | session |
/// | POST | `/admin/verify-payment` | admin |
/// | GET | `/admin/registrations` | admin |
/// | POST | `/flags` | session, rate limited |
/// | GET | `/flags` | staff |
/// | POST | `/flags/:id/review` | staff |
/// | GET | `/admin/live` | staff, WebSocket |
pub fn build_router(state: AppState) -> Router {
    let limited = middleware::from_fn_with_state(state.limiter.clone(), rate_limit);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        // Cart
        .route("/cart", get(cart::view_cart))
        .route("/cart/add", post(cart::add_item).route_layer(limited.clone()))
        .route("/cart/remove", delete(cart::remove_item))
        // Checkout and payments
        .route("/checkout", post(checkout::checkout).route_layer(limited.clone()))
        .route("/payments/notify", post(payments::gateway_notify))
        .route("/my-registrations", get(payments::my_registrations))
        .route("/admin/verify-payment", post(payments::verify_payment))
        .route("/admin/registrations", get(payments::list_registrations))
        // Moderation
        .route(
            "/flags",
            post(flags::create_flag)
                .route_layer(limited)
                .get(flags::list_flags),
        )
        .route("/flags/:id/review", post(flags::review_flag))
        .route("/admin/live", get(live_feed))
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
