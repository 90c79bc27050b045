//! Transactional mail.
//!
//! - [`ConsoleMailer`]: logs messages (development)
//! - [`SmtpMailer`]: delivers over SMTP with Lettre
//! - [`TimedMailer`]: bounds any mailer with a per-message timeout
//!
//! Services never fail because of mail. They pass the outcome to
//! [`log_failure`], which logs and counts it.

mod console;
mod smtp;
pub mod templates;

pub use console::ConsoleMailer;
pub use smtp::SmtpMailer;

use crate::config::{MailConfig, MailTransport};
use arena_core::mail::{
    ConsolidatedPendingPaymentEmail, FlagRaisedEmail, MailError, MailResult, Mailer,
    PaymentRejectedEmail, PaymentVerifiedEmail, PendingPaymentEmail,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a mailer so no send outlives `timeout`.
#[derive(Clone)]
pub struct TimedMailer {
    inner: Arc<dyn Mailer>,
    timeout: Duration,
}

impl TimedMailer {
    /// Bounds `inner` by `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn Mailer>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded(&self, send: impl Future<Output = MailResult> + Send) -> MailResult {
        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| MailError::Timeout(self.timeout.as_secs()))?
    }
}

#[async_trait]
impl Mailer for TimedMailer {
    async fn send_pending_payment(&self, email: &PendingPaymentEmail) -> MailResult {
        self.bounded(self.inner.send_pending_payment(email)).await
    }

    async fn send_pending_payment_consolidated(
        &self,
        email: &ConsolidatedPendingPaymentEmail,
    ) -> MailResult {
        self.bounded(self.inner.send_pending_payment_consolidated(email))
            .await
    }

    async fn send_payment_verified(&self, email: &PaymentVerifiedEmail) -> MailResult {
        self.bounded(self.inner.send_payment_verified(email)).await
    }

    async fn send_payment_rejected(&self, email: &PaymentRejectedEmail) -> MailResult {
        self.bounded(self.inner.send_payment_rejected(email)).await
    }

    async fn send_flag_raised(&self, email: &FlagRaisedEmail) -> MailResult {
        self.bounded(self.inner.send_flag_raised(email)).await
    }
}

/// Builds the configured mailer, bounded by the configured timeout.
///
/// # Errors
///
/// SMTP configuration errors (see [`SmtpMailer::new`]).
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    let inner: Arc<dyn Mailer> = match config.transport {
        MailTransport::Console => Arc::new(ConsoleMailer),
        MailTransport::Smtp => Arc::new(SmtpMailer::new(config)?),
    };
    Ok(Arc::new(TimedMailer::new(
        inner,
        Duration::from_secs(config.send_timeout),
    )))
}

/// Logs and counts a failed send. Mail is best-effort: the caller's primary
/// effect has already committed.
pub fn log_failure(template: &'static str, to: &str, result: MailResult) {
    if let Err(error) = result {
        tracing::warn!(template, %to, %error, "Failed to send email");
        crate::metrics::record_email_failure(template);
    }
}
