//! # Arena Testing
//!
//! Test doubles for the Arena platform.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every store trait over a single mutex, so compound
//!   writes are atomic the same way a database transaction is
//! - Deterministic environment: [`FixedClock`], [`ScriptedOrderSequence`],
//!   [`ScriptedCodeGenerator`]
//! - [`RecordingMailer`]: captures outgoing mail, optionally failing
//! - [`fixtures`]: ready-made users, competitions and posts
//!
//! ## Example
//!
//! ```ignore
//! use arena_testing::{fixtures, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! let member = store.insert_user(fixtures::member("ana@example.com"));
//! let competition = store.insert_competition(fixtures::competition("RBT", deadline));
//! ```

pub mod fixtures;
pub mod mocks;
mod store;

pub use mocks::{
    FixedClock, RecordingMailer, ScriptedCodeGenerator, ScriptedOrderSequence, SentMail,
    test_clock,
};
pub use store::InMemoryStore;
