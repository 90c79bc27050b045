//! Payment verification.
//!
//! Two entry points move payments out of PENDING:
//!
//! - [`VerificationService::verify_payment`]: an admin approves or rejects
//!   one registration of a bank-transfer payment
//! - [`VerificationService::handle_gateway_notification`]: the card gateway
//!   reports the outcome of a hosted payment
//!
//! Approval assigns the registration a display code unique within its
//! competition. Every decision is appended to the payment's audit trail in
//! the same store call that changes the statuses.
//!
//! Codes are checked against the store before the write, but the unique
//! indexes decide: a collision at write time redraws every code of that
//! write, [`CODE_WRITE_ATTEMPTS`] attempts in total.

use super::{sanitize, AttemptError, Dependencies};
use crate::gateway::{Gateway, GatewayNotification, NotificationStatus};
use crate::mail::log_failure;
use crate::metrics;
use crate::retry::{retry_if, RetryPolicy};
use arena_core::commerce::{
    GatewayNotice, Payment, PaymentStatus, Registration, RegistrationStatus, VerificationAudit,
    VerificationOutcome, VerificationSource,
};
use arena_core::mail::{PaymentRejectedEmail, PaymentVerifiedEmail, RegistrationLine};
use arena_core::store::{
    GatewayFailure, GatewaySettlement, VerificationUpdate, DISPLAY_CODE_CONSTRAINT,
    REGISTRATION_NUMBER_CONSTRAINT,
};
use arena_core::types::{Competition, CompetitionId, PaymentId, RegistrationId, Role, User};
use arena_core::{ArenaError, ArenaResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Display-code draws before giving up.
pub const DISPLAY_CODE_ATTEMPTS: u32 = 50;

/// Store writes per verification or settlement when freshly drawn codes
/// collide at insert, first attempt included.
pub const CODE_WRITE_ATTEMPTS: u32 = 3;

const CODE_WRITE_POLICY: RetryPolicy = RetryPolicy::fixed(CODE_WRITE_ATTEMPTS, Duration::ZERO);

const REASON_MAX: usize = 500;

/// Admin decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationDecision {
    /// Payment received
    Approve,
    /// Payment not accepted
    Reject {
        /// Shown to the customer
        reason: String,
    },
}

/// Admin verification input.
#[derive(Debug, Clone)]
pub struct VerifyPayment {
    /// Payment being verified
    pub payment_id: PaymentId,
    /// Registration of that payment
    pub registration_id: RegistrationId,
    /// Approve or reject
    pub decision: VerificationDecision,
}

/// What a gateway notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAck {
    /// Payment completed; this many registrations were confirmed
    Settled(usize),
    /// Payment marked FAILED
    Failed,
    /// Nothing changed (already processed, still pending, or unknown status)
    Unchanged,
}

/// Verification operations.
pub struct VerificationService {
    deps: Dependencies,
    gateway: Gateway,
}

impl VerificationService {
    /// Service verifying gateway callbacks with `gateway`.
    #[must_use]
    pub const fn new(deps: Dependencies, gateway: Gateway) -> Self {
        Self { deps, gateway }
    }

    /// Applies an admin's decision to one registration of a payment.
    ///
    /// Re-verifying an already decided registration is allowed and
    /// overwrites its status; each decision adds an audit entry.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless `admin` is an admin
    /// - `Validation` for a rejection without a reason or a registration of
    ///   another payment
    /// - `NotFound` for an unknown payment or registration
    pub async fn verify_payment(
        &self,
        admin: &User,
        request: VerifyPayment,
    ) -> ArenaResult<Registration> {
        if admin.role != Role::Admin {
            return Err(ArenaError::forbidden("Admin access required"));
        }
        let decision = match request.decision {
            VerificationDecision::Reject { reason } => {
                let reason = sanitize::text(&reason, REASON_MAX);
                if reason.is_empty() {
                    return Err(ArenaError::validation("A reason is required to reject"));
                }
                VerificationDecision::Reject { reason }
            }
            VerificationDecision::Approve => VerificationDecision::Approve,
        };

        let store = &self.deps.store;
        let payment = store
            .payment(request.payment_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("payment", request.payment_id))?;
        let registration = store
            .registration(request.registration_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("registration", request.registration_id))?;
        if registration.payment_id != Some(payment.id) {
            return Err(ArenaError::validation(
                "Registration does not belong to this payment",
            ));
        }

        let now = self.deps.clock.now();
        let (outcome, reject_reason) = match &decision {
            VerificationDecision::Approve => (VerificationOutcome::Approved, None),
            VerificationDecision::Reject { reason } => {
                (VerificationOutcome::Rejected, Some(reason.clone()))
            }
        };
        let audit = VerificationAudit {
            registration_id: Some(registration.id),
            outcome,
            source: VerificationSource::Admin,
            verified_by: Some(admin.id),
            verified_at: now,
            reject_reason,
        };

        let (payment_status, registration_status, confirmed_at) = match outcome {
            VerificationOutcome::Approved => (
                PaymentStatus::Completed,
                RegistrationStatus::Confirmed,
                Some(now),
            ),
            VerificationOutcome::Rejected => {
                (PaymentStatus::Failed, RegistrationStatus::Cancelled, None)
            }
        };
        // Approval draws a display code unless an earlier approval kept one.
        let competition = match (outcome, &registration.display_code) {
            (VerificationOutcome::Approved, None) => {
                Some(self.competition(registration.competition_id).await?)
            }
            _ => None,
        };

        let (audit, competition) = (&audit, competition.as_ref());
        let (payment_id, registration_id) = (payment.id, registration.id);
        let updated = retry_if(
            &CODE_WRITE_POLICY,
            move |attempt| async move {
                let display_code = match competition {
                    Some(competition) => {
                        Some(self.display_code(competition, &HashSet::new()).await?)
                    }
                    None => None,
                };
                let update = VerificationUpdate {
                    payment_id,
                    payment_status,
                    audit: audit.clone(),
                    registration_id,
                    registration_status,
                    display_code,
                    confirmed_at,
                    updated_at: now,
                };
                debug!(attempt, %registration_id, "Applying verification");
                let updated = self.deps.store.apply_verification(&update).await?;
                Ok::<_, AttemptError>(updated)
            },
            |err: &AttemptError| err.collided_on(&[DISPLAY_CODE_CONSTRAINT]),
        )
        .await?;
        info!(
            admin_id = %admin.id,
            order_id = %payment.order_id,
            registration_id = %updated.id,
            status = %updated.status,
            display_code = updated.display_code.as_deref().unwrap_or("-"),
            "Payment verified by admin"
        );
        metrics::record_verification(outcome, VerificationSource::Admin);

        let line = registration_line(&updated, &payment);
        let to = updated.customer.email.clone();
        let customer_name = updated.customer.full_name();
        match decision {
            VerificationDecision::Approve => {
                let email = PaymentVerifiedEmail {
                    to: to.clone(),
                    customer_name,
                    order_id: payment.order_id.clone(),
                    registration: line,
                    currency: payment.currency.clone(),
                };
                let result = self.deps.mailer.send_payment_verified(&email).await;
                log_failure("payment_verified", &to, result);
            }
            VerificationDecision::Reject { reason } => {
                let email = PaymentRejectedEmail {
                    to: to.clone(),
                    customer_name,
                    order_id: payment.order_id.clone(),
                    registration: line,
                    reason,
                };
                let result = self.deps.mailer.send_payment_rejected(&email).await;
                log_failure("payment_rejected", &to, result);
            }
        }

        Ok(updated)
    }

    /// Processes a gateway callback.
    ///
    /// Callbacks for payments that are no longer PENDING are acknowledged
    /// without changes, so gateway retries are harmless.
    ///
    /// # Errors
    ///
    /// - `Validation` for a bad signature, an unknown merchant, or an
    ///   amount or currency that does not match the order
    /// - `NotFound` for an unknown order id
    pub async fn handle_gateway_notification(
        &self,
        notification: GatewayNotification,
    ) -> ArenaResult<NotificationAck> {
        if let Err(e) = self.gateway.verify(&notification) {
            warn!(order_id = %notification.order_id, error = %e, "Rejected gateway notification");
            return Err(ArenaError::validation("Invalid payment notification"));
        }

        let store = &self.deps.store;
        let payment = store
            .payment_by_order_id(&notification.order_id)
            .await?
            .ok_or_else(|| ArenaError::not_found("order", &notification.order_id))?;
        if payment.status != PaymentStatus::Pending {
            debug!(order_id = %payment.order_id, status = %payment.status, "Notification for settled payment ignored");
            return Ok(NotificationAck::Unchanged);
        }

        let now = self.deps.clock.now();
        let notice = GatewayNotice {
            gateway_payment_id: notification.payment_id.clone(),
            status_code: notification.status_code,
            amount: notification.payhere_amount.clone(),
            currency: notification.payhere_currency.clone(),
            received_at: now,
        };

        match notification.status() {
            NotificationStatus::Success => {
                if notification.payhere_amount != payment.amount.to_decimal_string()
                    || notification.payhere_currency != payment.currency
                {
                    warn!(
                        order_id = %payment.order_id,
                        expected = %payment.amount,
                        received = %notification.payhere_amount,
                        currency = %notification.payhere_currency,
                        "Gateway amount mismatch"
                    );
                    return Err(ArenaError::validation(
                        "Notification amount does not match the order",
                    ));
                }
                self.settle(&payment, notice, now).await
            }
            NotificationStatus::Failed => {
                let failure = GatewayFailure {
                    payment_id: payment.id,
                    notice,
                    audit: gateway_audit(VerificationOutcome::Rejected, now),
                    failed_at: now,
                };
                if !store.fail_gateway_payment(&failure).await? {
                    return Ok(NotificationAck::Unchanged);
                }
                info!(order_id = %payment.order_id, status_code = notification.status_code, "Gateway payment failed");
                metrics::record_verification(
                    VerificationOutcome::Rejected,
                    VerificationSource::Gateway,
                );
                Ok(NotificationAck::Failed)
            }
            NotificationStatus::Pending => {
                debug!(order_id = %payment.order_id, "Gateway payment still pending");
                Ok(NotificationAck::Unchanged)
            }
            NotificationStatus::Unknown => {
                warn!(order_id = %payment.order_id, status_code = notification.status_code, "Unknown gateway status code");
                Ok(NotificationAck::Unchanged)
            }
        }
    }

    async fn settle(
        &self,
        payment: &Payment,
        notice: GatewayNotice,
        now: DateTime<Utc>,
    ) -> ArenaResult<NotificationAck> {
        let mut competitions: HashMap<CompetitionId, Competition> = HashMap::new();
        for item in &payment.items {
            if !competitions.contains_key(&item.competition_id) {
                let competition = self.competition(item.competition_id).await?;
                competitions.insert(competition.id, competition);
            }
        }

        let (competitions, notice) = (&competitions, &notice);
        let settlement = retry_if(
            &CODE_WRITE_POLICY,
            move |attempt| async move {
                let settlement = GatewaySettlement {
                    payment_id: payment.id,
                    notice: notice.clone(),
                    audit: gateway_audit(VerificationOutcome::Approved, now),
                    registrations: self.confirmed_registrations(payment, competitions, now).await?,
                    settled_at: now,
                };
                debug!(attempt, order_id = %payment.order_id, "Settling gateway payment");
                let settled = self.deps.store.settle_gateway_payment(&settlement).await?;
                Ok::<_, AttemptError>(settled.then_some(settlement))
            },
            |err: &AttemptError| {
                err.collided_on(&[REGISTRATION_NUMBER_CONSTRAINT, DISPLAY_CODE_CONSTRAINT])
            },
        )
        .await?;
        let Some(settlement) = settlement else {
            debug!(order_id = %payment.order_id, "Payment settled concurrently");
            return Ok(NotificationAck::Unchanged);
        };

        info!(
            order_id = %payment.order_id,
            registrations = settlement.registrations.len(),
            amount = %payment.amount,
            "Gateway payment completed"
        );
        metrics::record_verification(VerificationOutcome::Approved, VerificationSource::Gateway);

        let to = payment.customer.email.clone();
        for registration in &settlement.registrations {
            let email = PaymentVerifiedEmail {
                to: to.clone(),
                customer_name: payment.customer.full_name(),
                order_id: payment.order_id.clone(),
                registration: registration_line(registration, payment),
                currency: payment.currency.clone(),
            };
            let result = self.deps.mailer.send_payment_verified(&email).await;
            log_failure("payment_verified", &to, result);
        }

        Ok(NotificationAck::Settled(settlement.registrations.len()))
    }

    /// One CONFIRMED registration per item with fresh codes, unique against
    /// the store and each other.
    async fn confirmed_registrations(
        &self,
        payment: &Payment,
        competitions: &HashMap<CompetitionId, Competition>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Registration>, AttemptError> {
        let mut numbers: Vec<String> = Vec::with_capacity(payment.items.len());
        let mut codes: HashSet<String> = HashSet::new();
        let mut registrations = Vec::with_capacity(payment.items.len());

        for item in &payment.items {
            let number = loop {
                let candidate = self.deps.codes.registration_number();
                if !numbers.contains(&candidate)
                    && !self.deps.store.registration_number_exists(&candidate).await?
                {
                    break candidate;
                }
            };
            numbers.push(number.clone());

            let competition = competitions
                .get(&item.competition_id)
                .ok_or_else(|| ArenaError::not_found("competition", item.competition_id))?;
            let code = self.display_code(competition, &codes).await?;
            codes.insert(code.clone());

            registrations.push(Registration {
                id: RegistrationId::new(),
                user_id: payment.user_id,
                competition_id: item.competition_id,
                registration_type_id: item.registration_type_id,
                registration_number: number,
                display_code: Some(code),
                status: RegistrationStatus::Confirmed,
                amount_paid: item.amount,
                payment_id: Some(payment.id),
                customer: payment.customer.clone(),
                participant: item.participant.clone(),
                confirmed_at: Some(now),
                created_at: now,
                updated_at: now,
            });
        }
        Ok(registrations)
    }

    async fn competition(&self, id: CompetitionId) -> ArenaResult<Competition> {
        self.deps
            .store
            .competition(id)
            .await?
            .ok_or_else(|| ArenaError::not_found("competition", id))
    }

    /// Display code unused in the store and not in `taken`.
    async fn display_code(
        &self,
        competition: &Competition,
        taken: &HashSet<String>,
    ) -> ArenaResult<String> {
        for attempt in 1..=DISPLAY_CODE_ATTEMPTS {
            let candidate = self.deps.codes.display_code(competition);
            if taken.contains(&candidate)
                || self
                    .deps
                    .store
                    .display_code_exists(competition.id, &candidate)
                    .await?
            {
                debug!(attempt, %candidate, "Display code taken, redrawing");
                continue;
            }
            return Ok(candidate);
        }
        Err(ArenaError::internal(format!(
            "No free display code for {} after {DISPLAY_CODE_ATTEMPTS} attempts",
            competition.code
        )))
    }
}

fn gateway_audit(outcome: VerificationOutcome, at: DateTime<Utc>) -> VerificationAudit {
    VerificationAudit {
        registration_id: None,
        outcome,
        source: VerificationSource::Gateway,
        verified_by: None,
        verified_at: at,
        reject_reason: None,
    }
}

/// Email line for a registration, named from the payment's item snapshot.
fn registration_line(registration: &Registration, payment: &Payment) -> RegistrationLine {
    let snapshot = payment.items.iter().find(|item| {
        item.competition_id == registration.competition_id
            && item.registration_type_id == registration.registration_type_id
    });
    RegistrationLine {
        registration_number: registration.registration_number.clone(),
        competition_name: snapshot
            .map_or_else(|| registration.competition_id.to_string(), |s| s.competition_name.clone()),
        registration_type_name: snapshot.map_or_else(
            || registration.registration_type_id.to_string(),
            |s| s.registration_type_name.clone(),
        ),
        team_name: registration.participant.team_name.clone(),
        amount: registration.amount_paid,
    }
}
