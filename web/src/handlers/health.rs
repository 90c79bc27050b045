//! Health check endpoints.
//!
//! Used by load balancers and orchestrators. Liveness never touches
//! dependencies; readiness pings the store.

use crate::error::AppError;
use crate::response::ApiResponse;
use arena_core::store::ArenaStore;
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;

/// Probe result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// `"ok"` or `"ready"`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Liveness.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// { "success": true, "data": { "status": "ok", "version": "0.1.0" } }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> ApiResponse<HealthStatus> {
    ApiResponse::ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: 200 when the store answers, 503 otherwise.
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
///
/// # Errors
///
/// [`AppError::unavailable`] when the store ping fails.
pub async fn readiness(
    State(store): State<Arc<dyn ArenaStore>>,
) -> Result<ApiResponse<HealthStatus>, AppError> {
    store.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::unavailable("Store unavailable").with_source(e)
    })?;

    Ok(ApiResponse::ok(HealthStatus {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use arena_testing::InMemoryStore;
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_liveness() {
        let app = Router::new().route("/health", get(health_check));
        let server = TestServer::new(app).unwrap();

        let response = server.get("/health").await;
        response.assert_status(StatusCode::OK);
        response.assert_json(&json!({
            "success": true,
            "data": { "status": "ok", "version": env!("CARGO_PKG_VERSION") },
        }));
    }

    #[tokio::test]
    async fn test_readiness_with_healthy_store() {
        let store: Arc<dyn ArenaStore> = Arc::new(InMemoryStore::new());
        let app = Router::new()
            .route("/ready", get(readiness))
            .with_state(store);
        let server = TestServer::new(app).unwrap();

        let response = server.get("/ready").await;
        response.assert_status(StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["data"]["status"], "ready");
    }
}
