//! Console mailer for development.
//!
//! Renders every message and writes it to the log instead of sending it.

use super::templates::{self, RenderedEmail};
use arena_core::mail::{
    ConsolidatedPendingPaymentEmail, FlagRaisedEmail, MailResult, Mailer, PaymentRejectedEmail,
    PaymentVerifiedEmail, PendingPaymentEmail,
};
use async_trait::async_trait;

/// Logs rendered messages at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    fn print(rendered: &RenderedEmail) -> MailResult {
        tracing::info!(
            to = %rendered.to,
            subject = %rendered.subject,
            "📧 Email (console transport)\n{}",
            rendered.text
        );
        Ok(())
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send_pending_payment(&self, email: &PendingPaymentEmail) -> MailResult {
        Self::print(&templates::pending_payment(email))
    }

    async fn send_pending_payment_consolidated(
        &self,
        email: &ConsolidatedPendingPaymentEmail,
    ) -> MailResult {
        Self::print(&templates::pending_payment_consolidated(email))
    }

    async fn send_payment_verified(&self, email: &PaymentVerifiedEmail) -> MailResult {
        Self::print(&templates::payment_verified(email))
    }

    async fn send_payment_rejected(&self, email: &PaymentRejectedEmail) -> MailResult {
        Self::print(&templates::payment_rejected(email))
    }

    async fn send_flag_raised(&self, email: &FlagRaisedEmail) -> MailResult {
        Self::print(&templates::flag_raised(email))
    }
}
