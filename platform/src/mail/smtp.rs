//! SMTP mailer using Lettre.

use super::templates::{self, RenderedEmail};
use crate::config::MailConfig;
use arena_core::mail::{
    ConsolidatedPendingPaymentEmail, FlagRaisedEmail, MailError, MailResult, Mailer,
    PaymentRejectedEmail, PaymentVerifiedEmail, PendingPaymentEmail,
};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// Sends real mail over SMTP (STARTTLS relay).
///
/// # Configuration
///
/// - `smtp_host` / `smtp_port`: relay address (587 for STARTTLS)
/// - `smtp_username` / `smtp_password`: credentials; skipped when the
///   username is empty
/// - `from_email` / `from_name`: sender
/// - `send_timeout`: socket timeout in seconds
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

fn build_message(from: &Mailbox, rendered: RenderedEmail) -> Result<Message, MailError> {
    Message::builder()
        .from(from.clone())
        .to(mailbox(&rendered.to)?)
        .subject(rendered.subject)
        .multipart(MultiPart::alternative_plain_html(
            rendered.text,
            rendered.html,
        ))
        .map_err(|e| MailError::Build(e.to_string()))
}

impl SmtpMailer {
    /// Create a new SMTP mailer. No connection is made until the first
    /// send.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidAddress`] for a bad sender and
    /// [`MailError::Transport`] if the relay cannot be configured.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = mailbox(&format!("{} <{}>", config.from_name, config.from_email))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.send_timeout)));
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    async fn deliver(&self, rendered: RenderedEmail) -> MailResult {
        let to = rendered.to.clone();
        let message = build_message(&self.from, rendered)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(format!("Failed to send email: {e}")))?;
        tracing::debug!(%to, "Email delivered");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_pending_payment(&self, email: &PendingPaymentEmail) -> MailResult {
        self.deliver(templates::pending_payment(email)).await
    }

    async fn send_pending_payment_consolidated(
        &self,
        email: &ConsolidatedPendingPaymentEmail,
    ) -> MailResult {
        self.deliver(templates::pending_payment_consolidated(email))
            .await
    }

    async fn send_payment_verified(&self, email: &PaymentVerifiedEmail) -> MailResult {
        self.deliver(templates::payment_verified(email)).await
    }

    async fn send_payment_rejected(&self, email: &PaymentRejectedEmail) -> MailResult {
        self.deliver(templates::payment_rejected(email)).await
    }

    async fn send_flag_raised(&self, email: &FlagRaisedEmail) -> MailResult {
        self.deliver(templates::flag_raised(email)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::MailTransport;

    fn config() -> MailConfig {
        MailConfig {
            transport: MailTransport::Smtp,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "arena".to_string(),
            smtp_password: "secret".to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Arena".to_string(),
            send_timeout: 10,
        }
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let mut config = config();
        config.from_email = "not an address".to_string();
        assert!(matches!(
            SmtpMailer::new(&config),
            Err(MailError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_message_builds_for_valid_recipient() {
        let from = mailbox("Arena <noreply@example.com>").expect("sender");
        let rendered = RenderedEmail {
            to: "ana@example.com".to_string(),
            subject: "Registration confirmed".to_string(),
            text: "confirmed".to_string(),
            html: "<p>confirmed</p>".to_string(),
        };
        assert!(build_message(&from, rendered).is_ok());
    }

    #[test]
    fn test_invalid_recipient_fails_before_sending() {
        let from = mailbox("Arena <noreply@example.com>").expect("sender");
        let rendered = RenderedEmail {
            to: "nobody".to_string(),
            subject: "s".to_string(),
            text: "t".to_string(),
            html: "<p>t</p>".to_string(),
        };
        assert!(matches!(
            build_message(&from, rendered),
            Err(MailError::InvalidAddress { .. })
        ));
    }
}
