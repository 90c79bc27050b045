//! Hosted card-payment gateway (PayHere-style).
//!
//! Two signatures, both upper-case hex MD5 with the secret folded in as its
//! own upper-case MD5:
//!
//! ```text
//! checkout:  MD5(merchant_id + order_id + amount + currency + MD5(secret))
//! notify:    MD5(merchant_id + order_id + payhere_amount + payhere_currency
//!                + status_code + MD5(secret))
//! ```
//!
//! Amounts are always formatted with two decimals (`5000.00`).

use crate::config::GatewayConfig;
use arena_core::commerce::Payment;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway payload or callback problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Merchant credentials are not configured.
    #[error("payment gateway is not configured")]
    NotConfigured,

    /// The callback names a different merchant.
    #[error("notification for unknown merchant {0}")]
    MerchantMismatch(String),

    /// The callback signature does not match.
    #[error("invalid signature for order {order_id}")]
    InvalidSignature {
        /// Order the callback claimed to be about
        order_id: String,
    },
}

/// Upper-case hex MD5.
#[must_use]
pub fn md5_upper(input: &str) -> String {
    hex::encode_upper(Md5::digest(input.as_bytes()))
}

/// Fields the client posts to the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectPayload {
    /// Hosted checkout page
    #[serde(rename = "checkoutUrl")]
    pub checkout_url: String,
    /// Merchant id
    pub merchant_id: String,
    /// Customer return URL
    pub return_url: String,
    /// Customer cancel URL
    pub cancel_url: String,
    /// Server notification URL
    pub notify_url: String,
    /// Order id
    pub order_id: String,
    /// Item description
    pub items: String,
    /// Currency
    pub currency: String,
    /// Two-decimal amount
    pub amount: String,
    /// Customer first name
    pub first_name: String,
    /// Customer last name
    pub last_name: String,
    /// Customer email
    pub email: String,
    /// Customer phone
    pub phone: String,
    /// Customer address
    pub address: String,
    /// Customer city
    pub city: String,
    /// Customer country
    pub country: String,
    /// Checkout signature
    pub hash: String,
}

/// Server-to-server payment notification (form encoded).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayNotification {
    /// Merchant id
    pub merchant_id: String,
    /// Our order id
    pub order_id: String,
    /// Gateway-side payment reference
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Amount as charged
    pub payhere_amount: String,
    /// Currency as charged
    pub payhere_currency: String,
    /// Gateway status code
    pub status_code: i32,
    /// Signature
    pub md5sig: String,
}

/// Meaning of a notification's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    /// `2`: money received
    Success,
    /// `0`: still processing
    Pending,
    /// `-1`, `-2`, `-3`: cancelled, failed or charged back
    Failed,
    /// Anything else
    Unknown,
}

impl GatewayNotification {
    /// Classifies the status code.
    #[must_use]
    pub const fn status(&self) -> NotificationStatus {
        match self.status_code {
            2 => NotificationStatus::Success,
            0 => NotificationStatus::Pending,
            -3..=-1 => NotificationStatus::Failed,
            _ => NotificationStatus::Unknown,
        }
    }
}

/// Signs checkout payloads and verifies notifications.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    /// Gateway for the given merchant configuration.
    #[must_use]
    pub const fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Whether merchant credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.config.merchant_id.is_empty() && !self.config.merchant_secret.is_empty()
    }

    fn hashed_secret(&self) -> String {
        md5_upper(&self.config.merchant_secret)
    }

    /// Checkout hash for an order.
    #[must_use]
    pub fn checkout_hash(&self, order_id: &str, amount: &str, currency: &str) -> String {
        md5_upper(&format!(
            "{}{order_id}{amount}{currency}{}",
            self.config.merchant_id,
            self.hashed_secret()
        ))
    }

    /// Expected notification signature.
    #[must_use]
    pub fn notification_signature(&self, notification: &GatewayNotification) -> String {
        md5_upper(&format!(
            "{}{}{}{}{}{}",
            notification.merchant_id,
            notification.order_id,
            notification.payhere_amount,
            notification.payhere_currency,
            notification.status_code,
            self.hashed_secret()
        ))
    }

    /// Builds the signed redirect payload for a PENDING gateway payment.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConfigured`] without merchant credentials.
    pub fn redirect_payload(&self, payment: &Payment) -> Result<RedirectPayload, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let amount = payment.amount.to_decimal_string();
        let items = payment
            .items
            .iter()
            .map(|item| format!("{} - {}", item.competition_name, item.registration_type_name))
            .collect::<Vec<_>>()
            .join(", ");
        let customer = &payment.customer;

        Ok(RedirectPayload {
            checkout_url: self.config.checkout_url.clone(),
            merchant_id: self.config.merchant_id.clone(),
            return_url: self.config.return_url.clone(),
            cancel_url: self.config.cancel_url.clone(),
            notify_url: self.config.notify_url.clone(),
            order_id: payment.order_id.clone(),
            items,
            currency: payment.currency.clone(),
            hash: self.checkout_hash(&payment.order_id, &amount, &payment.currency),
            amount,
            first_name: customer.first_name.clone(),
            last_name: customer.last_name.clone(),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
            address: customer.address.clone().unwrap_or_default(),
            city: customer.city.clone().unwrap_or_default(),
            country: self.config.country.clone(),
        })
    }

    /// Verifies a notification's merchant and signature.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MerchantMismatch`] or
    /// [`GatewayError::InvalidSignature`].
    pub fn verify(&self, notification: &GatewayNotification) -> Result<(), GatewayError> {
        if notification.merchant_id != self.config.merchant_id {
            return Err(GatewayError::MerchantMismatch(
                notification.merchant_id.clone(),
            ));
        }
        let expected = self.notification_signature(notification);
        if !expected.eq_ignore_ascii_case(notification.md5sig.trim()) {
            return Err(GatewayError::InvalidSignature {
                order_id: notification.order_id.clone(),
            });
        }
        Ok(())
    }
}
