//! # Arena
//!
//! Forum and competition-registration platform: carts, checkout (bank
//! transfer or hosted card gateway), payment verification, registrations
//! and post moderation, served over HTTP with Axum.
//!
//! ## Layout
//!
//! - [`services`]: the workflows, written against the `arena-core` store
//!   and environment traits
//! - [`api`]: HTTP handlers, one thin function per route
//! - [`auth`]: session and role extractors
//! - [`server`]: application state and router
//! - [`gateway`]: card gateway signing and callback verification
//! - [`mail`]: console and SMTP mailers, message templates
//! - [`live`]: broadcast feed and WebSocket endpoint for staff dashboards
//! - [`retry`]: retry policy used for order-id collisions
//! - [`config`]: environment configuration
//! - [`metrics`]: Prometheus business metrics
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let store = Arc::new(PostgresStore::connect(&config.database.url, 10).await?);
//! let mailer = arena::mail::from_config(&config.mail)?;
//! let app = build_router(AppState::production(&config, store, mailer));
//! ```

#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
pub mod gateway;
pub mod live;
pub mod mail;
pub mod metrics;
pub mod retry;
pub mod server;
pub mod services;

pub use config::Config;
pub use server::{build_router, AppState};
