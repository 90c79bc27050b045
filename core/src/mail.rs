//! Transactional email.
//!
//! One [`Mailer`] method per template. Callers treat every failure as
//! non-fatal: the primary effect has already committed by the time a mail
//! is sent, so errors are logged and dropped.

use crate::types::{Money, PostId};
use crate::moderation::{FlagReason, FlagSeverity};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Delivery failure.
#[derive(Debug, Error)]
pub enum MailError {
    /// Recipient or sender address could not be parsed.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// Offending address
        address: String,
        /// Parser message
        reason: String,
    },

    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),

    /// The transport rejected or dropped the message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Delivery did not finish within the configured timeout.
    #[error("mail delivery timed out after {0} seconds")]
    Timeout(u64),
}

/// Result type for mail delivery.
pub type MailResult = Result<(), MailError>;

/// One line of a registration summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLine {
    /// Public registration number
    pub registration_number: String,
    /// Competition name
    pub competition_name: String,
    /// Registration type name
    pub registration_type_name: String,
    /// Team name, for team entries
    pub team_name: Option<String>,
    /// Amount for this entry
    pub amount: Money,
}

/// Pending-payment notice for a checkout with a single entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPaymentEmail {
    /// Recipient
    pub to: String,
    /// Customer's full name
    pub customer_name: String,
    /// Order identifier
    pub order_id: String,
    /// The entry
    pub registration: RegistrationLine,
    /// Currency code
    pub currency: String,
}

/// Pending-payment notice for a checkout with several entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedPendingPaymentEmail {
    /// Recipient
    pub to: String,
    /// Customer's full name
    pub customer_name: String,
    /// Order identifier
    pub order_id: String,
    /// All entries of the checkout
    pub registrations: Vec<RegistrationLine>,
    /// Sum of entry amounts
    pub total: Money,
    /// Currency code
    pub currency: String,
}

/// Payment verified notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifiedEmail {
    /// Recipient (the registration's own customer email)
    pub to: String,
    /// Customer's full name
    pub customer_name: String,
    /// Order identifier
    pub order_id: String,
    /// The confirmed entry
    pub registration: RegistrationLine,
    /// Currency code
    pub currency: String,
}

/// Payment rejected notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRejectedEmail {
    /// Recipient (the registration's own customer email)
    pub to: String,
    /// Customer's full name
    pub customer_name: String,
    /// Order identifier
    pub order_id: String,
    /// The cancelled entry
    pub registration: RegistrationLine,
    /// Reason entered by the admin
    pub reason: String,
}

/// High-severity flag alert for a moderator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRaisedEmail {
    /// Moderator address
    pub to: String,
    /// Flagged post
    pub post_id: PostId,
    /// Flagged post title
    pub post_title: String,
    /// Reporter display name
    pub reporter_name: String,
    /// Reason
    pub reason: FlagReason,
    /// Severity
    pub severity: FlagSeverity,
    /// Reporter's details
    pub details: Option<String>,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Pending-payment notice, one entry.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if delivery fails.
    async fn send_pending_payment(&self, email: &PendingPaymentEmail) -> MailResult;

    /// Pending-payment notice, several entries.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if delivery fails.
    async fn send_pending_payment_consolidated(
        &self,
        email: &ConsolidatedPendingPaymentEmail,
    ) -> MailResult;

    /// Payment verified notice.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if delivery fails.
    async fn send_payment_verified(&self, email: &PaymentVerifiedEmail) -> MailResult;

    /// Payment rejected notice.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if delivery fails.
    async fn send_payment_rejected(&self, email: &PaymentRejectedEmail) -> MailResult;

    /// High-severity flag alert.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if delivery fails.
    async fn send_flag_raised(&self, email: &FlagRaisedEmail) -> MailResult;
}
