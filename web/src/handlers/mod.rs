//! HTTP request handlers shared by every Arena deployment.

pub mod health;

pub use health::{health_check, readiness};
