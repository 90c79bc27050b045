//! # Arena Core
//!
//! Domain types, error taxonomy and injected dependencies for the Arena
//! forum and competition-registration platform.
//!
//! ## Layout
//!
//! - [`types`]: identifiers, money, users and the competition catalog
//! - [`commerce`]: carts, payments and registrations
//! - [`moderation`]: posts, flags, moderation log and notifications
//! - [`environment`]: clock, order sequence, code generation
//! - [`mail`]: the transactional mail trait and its message types
//! - [`store`]: persistence traits implemented by `arena-postgres` and
//!   `arena-testing`
//! - [`error`]: `ArenaError` (domain taxonomy) and `StoreError`
//!
//! Services in `arena-platform` depend only on the traits defined here, so
//! every workflow runs unchanged against PostgreSQL in production and the
//! in-memory store in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod commerce;
pub mod environment;
pub mod error;
pub mod mail;
pub mod moderation;
pub mod store;
pub mod types;

pub use error::{ArenaError, ArenaResult, StoreError, StoreResult};
pub use store::ArenaStore;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
