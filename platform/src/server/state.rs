//! Application state for the HTTP server.
//!
//! Cloned per request; everything inside is behind an `Arc` or is a cheap
//! handle.

use crate::config::Config;
use crate::live::LiveFeed;
use crate::services::{Dependencies, Services};
use arena_core::environment::{
    Clock, CodeGenerator, MonotonicOrderSequence, OrderSequence, RandomCodeGenerator, SystemClock,
};
use arena_core::mail::Mailer;
use arena_core::ArenaStore;
use arena_web::RateLimiter;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// Collaborators (store, clock, mailer, feed)
    pub deps: Dependencies,
    /// Business workflows
    pub services: Services,
    /// Per-IP limiter for mutating endpoints
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State wired from explicit dependencies.
    #[must_use]
    pub fn new(deps: Dependencies, config: &Config) -> Self {
        let services = Services::new(&deps, config);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_seconds),
        ));
        Self {
            deps,
            services,
            limiter,
        }
    }

    /// Production wiring: system clock, millisecond order ids and random
    /// codes.
    #[must_use]
    pub fn production(config: &Config, store: Arc<dyn ArenaStore>, mailer: Arc<dyn Mailer>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let orders: Arc<dyn OrderSequence> = Arc::new(MonotonicOrderSequence::new());
        let codes: Arc<dyn CodeGenerator> = Arc::new(RandomCodeGenerator);
        Self::new(
            Dependencies {
                store,
                clock,
                orders,
                codes,
                mailer,
                feed: LiveFeed::default(),
            },
            config,
        )
    }
}

impl FromRef<AppState> for Arc<dyn ArenaStore> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.deps.store)
    }
}

impl FromRef<AppState> for LiveFeed {
    fn from_ref(state: &AppState) -> Self {
        state.deps.feed.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.limiter)
    }
}
