//! Checkout: turns the caller's cart into a payment.
//!
//! # Bank transfer
//!
//! One atomic store call writes the PENDING payment, one PENDING
//! registration per item and completes the cart. The customer then gets a
//! pending-payment email (consolidated when there are several items).
//!
//! # Gateway
//!
//! One atomic store call writes the PENDING payment and completes the cart,
//! so the cart can be paid for only once and later items go to a new cart.
//! Registrations are created when the gateway confirms. The response
//! carries the signed redirect payload.
//!
//! Both writes only succeed on an ACTIVE cart; a concurrent second checkout
//! fails validation.
//!
//! # Order ids
//!
//! Order ids are drawn from the [`OrderSequence`](arena_core::environment::OrderSequence)
//! and the payments table's unique index decides. A collision on the order
//! id or on a registration number redraws after a short delay,
//! [`ORDER_ID_ATTEMPTS`] attempts in total.

use super::{sanitize, Dependencies};
use crate::gateway::{Gateway, RedirectPayload};
use crate::mail::log_failure;
use crate::metrics;
use crate::retry::{retry_if, RetryPolicy};
use arena_core::commerce::{
    Cart, CartStatus, ItemSnapshot, Payment, PaymentMetadata, PaymentMethod, PaymentStatus,
    Registration, RegistrationStatus,
};
use arena_core::mail::{ConsolidatedPendingPaymentEmail, PendingPaymentEmail, RegistrationLine};
use arena_core::store::{
    BankCheckout, GatewayCheckout, ORDER_ID_CONSTRAINT, REGISTRATION_NUMBER_CONSTRAINT,
};
use arena_core::types::{CustomerDetails, Money, PaymentId, RegistrationId, User};
use arena_core::{ArenaError, ArenaResult, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order-id draws per checkout, first attempt included.
pub const ORDER_ID_ATTEMPTS: u32 = 3;

const URL_MAX: usize = 2048;

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentChoice {
    /// Manual bank transfer with an uploaded slip
    Bank {
        /// Location of the uploaded slip
        bank_slip_url: String,
    },
    /// Hosted card gateway
    Card,
}

/// Checkout input.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Contact details
    pub customer: CustomerDetails,
    /// Payment method
    pub payment: PaymentChoice,
}

/// Checkout result.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CheckoutOutcome {
    /// Bank transfer recorded
    #[serde(rename_all = "camelCase")]
    BankTransfer {
        /// Committed order id
        order_id: String,
        /// One per registration, in cart order
        registration_numbers: Vec<String>,
    },
    /// Gateway payment awaiting the customer
    #[serde(rename_all = "camelCase")]
    Gateway {
        /// Committed order id
        order_id: String,
        /// Signed form fields for the gateway redirect
        gateway: RedirectPayload,
    },
}

impl CheckoutOutcome {
    /// The committed order id.
    #[must_use]
    pub fn order_id(&self) -> &str {
        match self {
            Self::BankTransfer { order_id, .. } | Self::Gateway { order_id, .. } => order_id,
        }
    }
}

/// Checkout operations.
pub struct CheckoutService {
    deps: Dependencies,
    gateway: Gateway,
    order_policy: RetryPolicy,
    currency: String,
}

impl CheckoutService {
    /// Service charging in `currency`.
    #[must_use]
    pub const fn new(
        deps: Dependencies,
        gateway: Gateway,
        order_policy: RetryPolicy,
        currency: String,
    ) -> Self {
        Self {
            deps,
            gateway,
            order_policy,
            currency,
        }
    }

    /// Checks out the caller's ACTIVE cart.
    ///
    /// # Errors
    ///
    /// - `Validation` for missing customer fields, a missing bank slip, or
    ///   an empty or expired cart
    /// - `Internal` if no unique order id could be drawn or the gateway is
    ///   not configured
    pub async fn checkout(
        &self,
        user: &User,
        request: CheckoutRequest,
    ) -> ArenaResult<CheckoutOutcome> {
        let customer = clean_customer(request.customer)?;
        let payment = match request.payment {
            PaymentChoice::Bank { bank_slip_url } => {
                let url = sanitize::text(&bank_slip_url, URL_MAX);
                if url.is_empty() {
                    return Err(ArenaError::validation(
                        "A bank slip is required for bank transfer",
                    ));
                }
                PaymentChoice::Bank { bank_slip_url: url }
            }
            PaymentChoice::Card => PaymentChoice::Card,
        };

        let now = self.deps.clock.now();
        let cart = self.checkout_cart(user, now).await?;

        match payment {
            PaymentChoice::Bank { bank_slip_url } => {
                self.bank_transfer(user, &cart, customer, bank_slip_url, now)
                    .await
            }
            PaymentChoice::Card => self.card(user, &cart, customer, now).await,
        }
    }

    async fn checkout_cart(&self, user: &User, now: DateTime<Utc>) -> ArenaResult<Cart> {
        let cart = self
            .deps
            .store
            .active_cart(user.id)
            .await?
            .filter(|cart| !cart.items.is_empty())
            .ok_or_else(|| ArenaError::validation("Your cart is empty"))?;

        if cart.is_expired_at(now) {
            self.deps
                .store
                .set_cart_status(cart.id, CartStatus::Expired, now)
                .await?;
            info!(cart_id = %cart.id, user_id = %user.id, "Cart expired at checkout");
            return Err(ArenaError::validation(
                "Your cart has expired, please add the items again",
            ));
        }
        Ok(cart)
    }

    #[allow(clippy::too_many_arguments)]
    fn draft_payment(
        &self,
        user: &User,
        cart: &Cart,
        customer: &CustomerDetails,
        method: PaymentMethod,
        bank_slip_url: Option<String>,
        order_id: String,
        now: DateTime<Utc>,
    ) -> Payment {
        Payment {
            id: PaymentId::new(),
            order_id,
            user_id: user.id,
            amount: cart.subtotal(),
            currency: self.currency.clone(),
            status: PaymentStatus::Pending,
            method,
            items: cart.items.iter().map(ItemSnapshot::from).collect(),
            customer: customer.clone(),
            metadata: PaymentMetadata {
                cart_id: Some(cart.id),
                item_ids: cart.items.iter().map(|item| item.id).collect(),
                bank_slip_url,
                ..PaymentMetadata::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    async fn bank_transfer(
        &self,
        user: &User,
        cart: &Cart,
        customer: CustomerDetails,
        bank_slip_url: String,
        now: DateTime<Utc>,
    ) -> ArenaResult<CheckoutOutcome> {
        let customer = &customer;
        let bank_slip_url = &bank_slip_url;
        let checkout = retry_if(
            &self.order_policy,
            move |attempt| async move {
                let numbers = self.registration_numbers(cart.items.len()).await?;
                let payment = self.draft_payment(
                    user,
                    cart,
                    customer,
                    PaymentMethod::BankTransfer,
                    Some(bank_slip_url.clone()),
                    self.deps.orders.next_order_id(),
                    now,
                );
                let registrations = pending_registrations(&payment, &numbers, now);
                let checkout = BankCheckout {
                    payment,
                    registrations,
                    cart_id: cart.id,
                    completed_at: now,
                };
                debug!(attempt, order_id = %checkout.payment.order_id, "Recording bank checkout");
                match self.deps.store.record_bank_checkout(&checkout).await {
                    Ok(()) => Ok(checkout),
                    Err(e) => Err(note_collision(e)),
                }
            },
            is_checkout_collision,
        )
        .await
        .map_err(order_id_exhausted)?;
        let numbers = checkout
            .registrations
            .iter()
            .map(|registration| registration.registration_number.clone())
            .collect();

        let payment = &checkout.payment;
        info!(
            user_id = %user.id,
            order_id = %payment.order_id,
            registrations = checkout.registrations.len(),
            amount = %payment.amount,
            "Bank transfer checkout recorded"
        );
        metrics::record_checkout(PaymentMethod::BankTransfer);

        self.send_pending_email(payment, &checkout.registrations).await;

        Ok(CheckoutOutcome::BankTransfer {
            order_id: payment.order_id.clone(),
            registration_numbers: numbers,
        })
    }

    async fn card(
        &self,
        user: &User,
        cart: &Cart,
        customer: CustomerDetails,
        now: DateTime<Utc>,
    ) -> ArenaResult<CheckoutOutcome> {
        if !self.gateway.is_configured() {
            return Err(ArenaError::internal("Payment gateway is not configured"));
        }

        let store = Arc::clone(&self.deps.store);
        let checkout = retry_if(
            &self.order_policy,
            |attempt| {
                let checkout = GatewayCheckout {
                    payment: self.draft_payment(
                        user,
                        cart,
                        &customer,
                        PaymentMethod::Gateway,
                        None,
                        self.deps.orders.next_order_id(),
                        now,
                    ),
                    cart_id: cart.id,
                    completed_at: now,
                };
                let store = Arc::clone(&store);
                async move {
                    debug!(attempt, order_id = %checkout.payment.order_id, "Recording gateway checkout");
                    match store.record_gateway_payment(&checkout).await {
                        Ok(()) => Ok(checkout),
                        Err(e) => Err(note_collision(e)),
                    }
                }
            },
            is_order_collision,
        )
        .await
        .map_err(order_id_exhausted)?;
        let payment = checkout.payment;

        let gateway = self.gateway.redirect_payload(&payment).map_err(|e| ArenaError::Internal {
            message: "Could not build the gateway redirect".to_string(),
            source: Some(Box::new(e)),
        })?;

        info!(
            user_id = %user.id,
            order_id = %payment.order_id,
            amount = %payment.amount,
            "Gateway checkout started"
        );
        metrics::record_checkout(PaymentMethod::Gateway);

        Ok(CheckoutOutcome::Gateway {
            order_id: payment.order_id,
            gateway,
        })
    }

    /// `count` registration numbers, unique against the store and each
    /// other. Draws until enough are found; the unique index still decides
    /// at insert.
    async fn registration_numbers(&self, count: usize) -> StoreResult<Vec<String>> {
        let mut numbers: Vec<String> = Vec::with_capacity(count);
        while numbers.len() < count {
            let candidate = self.deps.codes.registration_number();
            if numbers.contains(&candidate)
                || self.deps.store.registration_number_exists(&candidate).await?
            {
                debug!(%candidate, "Registration number taken, redrawing");
                continue;
            }
            numbers.push(candidate);
        }
        Ok(numbers)
    }

    async fn send_pending_email(&self, payment: &Payment, registrations: &[Registration]) {
        let lines: Vec<RegistrationLine> = payment
            .items
            .iter()
            .zip(registrations)
            .map(|(item, registration)| RegistrationLine {
                registration_number: registration.registration_number.clone(),
                competition_name: item.competition_name.clone(),
                registration_type_name: item.registration_type_name.clone(),
                team_name: item.participant.team_name.clone(),
                amount: item.amount,
            })
            .collect();
        let to = payment.customer.email.clone();
        let customer_name = payment.customer.full_name();

        if let [line] = lines.as_slice() {
            let email = PendingPaymentEmail {
                to: to.clone(),
                customer_name,
                order_id: payment.order_id.clone(),
                registration: line.clone(),
                currency: payment.currency.clone(),
            };
            let result = self.deps.mailer.send_pending_payment(&email).await;
            log_failure("pending_payment", &to, result);
        } else {
            let total: Money = lines.iter().map(|line| line.amount).sum();
            let email = ConsolidatedPendingPaymentEmail {
                to: to.clone(),
                customer_name,
                order_id: payment.order_id.clone(),
                registrations: lines,
                total,
                currency: payment.currency.clone(),
            };
            let result = self.deps.mailer.send_pending_payment_consolidated(&email).await;
            log_failure("pending_payment_consolidated", &to, result);
        }
    }
}

fn pending_registrations(
    payment: &Payment,
    numbers: &[String],
    now: DateTime<Utc>,
) -> Vec<Registration> {
    payment
        .items
        .iter()
        .zip(numbers)
        .map(|(item, number)| Registration {
            id: RegistrationId::new(),
            user_id: payment.user_id,
            competition_id: item.competition_id,
            registration_type_id: item.registration_type_id,
            registration_number: number.clone(),
            display_code: None,
            status: RegistrationStatus::Pending,
            amount_paid: item.amount,
            payment_id: Some(payment.id),
            customer: payment.customer.clone(),
            participant: item.participant.clone(),
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn is_order_collision(err: &StoreError) -> bool {
    err.is_unique_violation_of(ORDER_ID_CONSTRAINT)
}

fn is_checkout_collision(err: &StoreError) -> bool {
    is_order_collision(err) || err.is_unique_violation_of(REGISTRATION_NUMBER_CONSTRAINT)
}

fn note_collision(err: StoreError) -> StoreError {
    if is_order_collision(&err) {
        warn!("Order id collision");
        metrics::record_order_id_collision();
    } else if err.is_unique_violation_of(REGISTRATION_NUMBER_CONSTRAINT) {
        warn!("Registration number collision");
    }
    err
}

fn order_id_exhausted(err: StoreError) -> ArenaError {
    if is_checkout_collision(&err) {
        ArenaError::Internal {
            message: format!("No unique order id after {ORDER_ID_ATTEMPTS} attempts"),
            source: Some(Box::new(err)),
        }
    } else {
        err.into()
    }
}

fn clean_customer(customer: CustomerDetails) -> ArenaResult<CustomerDetails> {
    let cleaned = CustomerDetails {
        first_name: sanitize::text(&customer.first_name, 100),
        last_name: sanitize::text(&customer.last_name, 100),
        email: sanitize::text(&customer.email, 254),
        phone: sanitize::text(&customer.phone, 32),
        address: sanitize::optional(customer.address.as_deref(), 300),
        city: sanitize::optional(customer.city.as_deref(), 100),
    };

    let missing: Vec<&str> = [
        ("firstName", &cleaned.first_name),
        ("lastName", &cleaned.last_name),
        ("email", &cleaned.email),
        ("phone", &cleaned.phone),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(field, _)| field)
    .collect();
    if !missing.is_empty() {
        return Err(ArenaError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    if !sanitize::looks_like_email(&cleaned.email) {
        return Err(ArenaError::validation("Invalid email address"));
    }
    Ok(cleaned)
}
