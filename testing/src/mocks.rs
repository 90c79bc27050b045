//! Deterministic stand-ins for the injected environment.

use arena_core::environment::{
    Clock, CodeGenerator, OrderSequence, REGISTRATION_ALPHABET, REGISTRATION_NUMBER_LEN,
    format_display_code,
};
use arena_core::mail::{
    ConsolidatedPendingPaymentEmail, FlagRaisedEmail, MailError, MailResult, Mailer,
    PaymentRejectedEmail, PaymentVerifiedEmail, PendingPaymentEmail,
};
use arena_core::types::Competition;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed clock for deterministic tests.
///
/// Returns the same instant until moved with [`FixedClock::advance`].
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    millis: Arc<AtomicI64>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(time.timestamp_millis())),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Default fixed clock for tests (2026-03-01 09:00:00 UTC).
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::from_timestamp(1_772_355_600, 0).unwrap_or_default(),
    )
}

/// Order sequence that replays scripted ids, then counts upwards
/// (`ORDER-TEST-1`, `ORDER-TEST-2`, ...).
#[derive(Debug, Default)]
pub struct ScriptedOrderSequence {
    script: Mutex<VecDeque<String>>,
    fallback: AtomicU64,
    draws: AtomicU32,
}

impl ScriptedOrderSequence {
    /// Sequence that replays `ids` first.
    #[must_use]
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(ids.into_iter().map(Into::into).collect()),
            fallback: AtomicU64::new(0),
            draws: AtomicU32::new(0),
        }
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn draws(&self) -> u32 {
        self.draws.load(Ordering::SeqCst)
    }
}

impl OrderSequence for ScriptedOrderSequence {
    fn next_order_id(&self) -> String {
        self.draws.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        scripted.unwrap_or_else(|| {
            let n = self.fallback.fetch_add(1, Ordering::SeqCst) + 1;
            format!("ORDER-TEST-{n}")
        })
    }
}

/// Code generator that replays scripted codes, then falls back to a
/// counter rendered in the registration alphabet.
#[derive(Debug, Default)]
pub struct ScriptedCodeGenerator {
    numbers: Mutex<VecDeque<String>>,
    display_serials: Mutex<VecDeque<u32>>,
    counter: AtomicU64,
    display_counter: AtomicU32,
}

impl ScriptedCodeGenerator {
    /// Generator with no script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration numbers to hand out first.
    #[must_use]
    pub fn with_registration_numbers<I, S>(self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.numbers.lock() {
            queue.extend(numbers.into_iter().map(Into::into));
        }
        self
    }

    /// Display-code serials to hand out first.
    #[must_use]
    pub fn with_display_serials(self, serials: impl IntoIterator<Item = u32>) -> Self {
        if let Ok(mut queue) = self.display_serials.lock() {
            queue.extend(serials);
        }
        self
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn registration_number(&self) -> String {
        let scripted = self.numbers.lock().ok().and_then(|mut q| q.pop_front());
        scripted.unwrap_or_else(|| {
            let mut n = self.counter.fetch_add(1, Ordering::SeqCst);
            let base = REGISTRATION_ALPHABET.len() as u64;
            let mut code = vec![REGISTRATION_ALPHABET[0]; REGISTRATION_NUMBER_LEN];
            for slot in code.iter_mut().rev() {
                #[allow(clippy::cast_possible_truncation)] // remainder < alphabet length
                let idx = (n % base) as usize;
                *slot = REGISTRATION_ALPHABET[idx];
                n /= base;
            }
            String::from_utf8_lossy(&code).into_owned()
        })
    }

    fn display_code(&self, competition: &Competition) -> String {
        let scripted = self
            .display_serials
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());
        let serial =
            scripted.unwrap_or_else(|| self.display_counter.fetch_add(1, Ordering::SeqCst) + 1);
        format_display_code(competition, serial)
    }
}

/// A message captured by [`RecordingMailer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMail {
    /// Single-entry pending notice
    PendingPayment(PendingPaymentEmail),
    /// Multi-entry pending notice
    PendingPaymentConsolidated(ConsolidatedPendingPaymentEmail),
    /// Verified notice
    PaymentVerified(PaymentVerifiedEmail),
    /// Rejected notice
    PaymentRejected(PaymentRejectedEmail),
    /// Flag alert
    FlagRaised(FlagRaisedEmail),
}

/// Mailer that records every message.
///
/// With [`RecordingMailer::failing`], every send returns a transport error
/// (the attempt is still recorded).
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingMailer {
    /// Mailer that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailer that rejects everything.
    #[must_use]
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.fail.store(true, Ordering::SeqCst);
        mailer
    }

    /// Snapshot of recorded messages.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, mail: SentMail) -> MailResult {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("recording mailer set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_pending_payment(&self, email: &PendingPaymentEmail) -> MailResult {
        self.record(SentMail::PendingPayment(email.clone()))
    }

    async fn send_pending_payment_consolidated(
        &self,
        email: &ConsolidatedPendingPaymentEmail,
    ) -> MailResult {
        self.record(SentMail::PendingPaymentConsolidated(email.clone()))
    }

    async fn send_payment_verified(&self, email: &PaymentVerifiedEmail) -> MailResult {
        self.record(SentMail::PaymentVerified(email.clone()))
    }

    async fn send_payment_rejected(&self, email: &PaymentRejectedEmail) -> MailResult {
        self.record(SentMail::PaymentRejected(email.clone()))
    }

    async fn send_flag_raised(&self, email: &FlagRaisedEmail) -> MailResult {
        self.record(SentMail::FlagRaised(email.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now() - time1, Duration::minutes(5));
    }

    #[test]
    fn test_scripted_sequence_falls_back() {
        let seq = ScriptedOrderSequence::new(["ORDER-1"]);
        assert_eq!(seq.next_order_id(), "ORDER-1");
        assert_eq!(seq.next_order_id(), "ORDER-TEST-1");
        assert_eq!(seq.draws(), 2);
    }

    #[test]
    fn test_fallback_registration_numbers_are_distinct() {
        let generator = ScriptedCodeGenerator::new().with_registration_numbers(["AAAAAA"]);
        let first = generator.registration_number();
        let second = generator.registration_number();
        let third = generator.registration_number();
        assert_eq!(first, "AAAAAA");
        assert_eq!(second, "AAAAAA");
        assert_eq!(third, "AAAAAB");
    }
}
