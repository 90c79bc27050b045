//! Injected dependencies: time, order identifiers and random codes.
//!
//! Services never call `Utc::now()` or a random number generator directly.
//! Production wires [`SystemClock`], [`MonotonicOrderSequence`] and
//! [`RandomCodeGenerator`]; tests swap in deterministic versions from
//! `arena-testing`.

use crate::types::Competition;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of order identifiers.
///
/// Every call must return a fresh draw. Uniqueness across instances is not
/// guaranteed here; the payments table's unique index is the arbiter and
/// checkout retries on collision.
pub trait OrderSequence: Send + Sync {
    /// Next order identifier (`ORDER-<n>`).
    fn next_order_id(&self) -> String;
}

/// Millisecond-timestamp order ids, strictly increasing within a process.
#[derive(Debug, Default)]
pub struct MonotonicOrderSequence {
    last: AtomicI64,
}

impl MonotonicOrderSequence {
    /// Creates a sequence starting from the current time.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }
}

impl OrderSequence for MonotonicOrderSequence {
    fn next_order_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        format!("ORDER-{}", now.max(previous + 1))
    }
}

/// Generator for registration numbers and display codes.
///
/// Generators only draw candidates; collision checks happen in services
/// against the store.
pub trait CodeGenerator: Send + Sync {
    /// Candidate public registration number.
    fn registration_number(&self) -> String;

    /// Candidate admin display code for a registration in `competition`.
    fn display_code(&self, competition: &Competition) -> String;
}

/// Alphabet without look-alike characters (`0/O`, `1/I/L`).
pub const REGISTRATION_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of a registration number.
pub const REGISTRATION_NUMBER_LEN: usize = 6;

/// Thread-local RNG backed generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn registration_number(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..REGISTRATION_NUMBER_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..REGISTRATION_ALPHABET.len());
                char::from(REGISTRATION_ALPHABET[idx])
            })
            .collect()
    }

    fn display_code(&self, competition: &Competition) -> String {
        let serial: u32 = rand::thread_rng().gen_range(0..10_000);
        format_display_code(competition, serial)
    }
}

/// `{CODE}{YY}-{NNNN}`, e.g. `RBT26-0042`.
#[must_use]
pub fn format_display_code(competition: &Competition, serial: u32) -> String {
    format!(
        "{}{:02}-{:04}",
        competition.code.to_uppercase(),
        competition.short_year(),
        serial % 10_000
    )
}
